//! Session manager integration tests over the loopback transport

mod common;
mod lifecycle_tests;
mod receive_tests;
