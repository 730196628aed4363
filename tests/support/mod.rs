#![allow(dead_code)]

pub mod manual;
pub mod socket_guard;
