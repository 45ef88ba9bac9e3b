//! Data store modules for Supabase integration

pub mod progress;
pub mod supabase;

pub use progress::ProgressStore;
pub use supabase::SupabaseClient;
