//! Gateway middleware module

pub mod rate_limit;
