//! Profiles vertical slice.
//!
//! [`ProfileService`] guards every store call with an ability built from
//! [`policy::PROFILE_RULES`] for the calling user.

pub mod memory;
pub mod model;
pub mod policy;
pub mod service;
pub mod store;

pub use memory::MemoryProfileStore;
pub use model::{NamePatch, NewProfile, PROFILE, Profile, ProfileName, ProfilePatch};
pub use policy::{PROFILE_RULES, SYSTEM_USERNAME, profile_ability};
pub use service::{
    AbilityFactory, DeleteMode, ProfileDetails, ProfileResponse, ProfileService,
    UnknownDeleteMode,
};
pub use store::{ProfileStore, SeaOrmProfileStore};
