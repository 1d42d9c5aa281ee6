//! State Management Module
//!
//! Visitor preferences persisted between page loads.

pub mod preferences;

pub use preferences::{
    FilePreferences, MemoryPreferences, PreferenceStore, PreferencesSnapshot, SessionRecord,
    StoredPreferences,
};
