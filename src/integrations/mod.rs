//! Hosted identity providers.

pub mod supabase;

pub use supabase::{SupabaseConfig, SupabaseGateway};
