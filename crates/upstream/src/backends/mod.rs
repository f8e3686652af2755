//! Storage provider implementations.

pub mod b2;
pub mod supabase;
