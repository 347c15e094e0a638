pub mod supabase;

pub use supabase::{SupabaseClient, SupabaseApiError, api_error, return_representation};
