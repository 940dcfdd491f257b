//! The protocol layers on top of the raw transport.
//!
//! There is only one. The IPv4 layer is handled by the operating system (or by a header emitted
//! together with each segment) so the tcp layer talks to a [`nic::Socket`] directly.
//!
//! [`nic::Socket`]: ../nic/trait.Socket.html
pub mod tcp;
