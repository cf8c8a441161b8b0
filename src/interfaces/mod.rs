//! User interfaces other than HTTP

pub mod cli;
