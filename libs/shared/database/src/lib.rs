pub mod settings;
pub mod supabase;

pub use settings::{
    ClinicSettings, InMemorySettingsRepository, SettingsRepository, SettingsService,
    SupabaseSettingsRepository, UpdateSettingsRequest,
};
pub use supabase::SupabaseClient;
