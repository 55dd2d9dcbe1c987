//! Sea-ORM entity definitions
//!
//! These map the tracker's domain records to database tables.

pub mod device;
pub mod reference_point;
pub mod reference_point_sample;
pub mod visit;
pub mod zone;

// Re-export all entities
pub use device::Entity as Device;
pub use reference_point::Entity as ReferencePoint;
pub use reference_point_sample::Entity as ReferencePointSample;
pub use visit::Entity as Visit;
pub use zone::Entity as Zone;

// Re-export active models for easy access
pub use device::ActiveModel as DeviceActive;
pub use reference_point::ActiveModel as ReferencePointActive;
pub use reference_point_sample::ActiveModel as ReferencePointSampleActive;
pub use visit::ActiveModel as VisitActive;
pub use zone::ActiveModel as ZoneActive;
