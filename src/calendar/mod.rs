//! Release calendar: when does each month's observation become public.

pub mod availability;

pub use availability::*;
