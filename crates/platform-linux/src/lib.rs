//! kmsgrab Linux Platform Integration
//!
//! Direct KMS/DRM access for grabbing the scanned-out framebuffer:
//! - **DRM ioctls:** capability, plane, and framebuffer queries plus prime export
//! - **Device discovery:** card node probing and diagnostics
//! - **Mapping:** read-only mmap of the exported buffer
//! - **Privileges:** dropping to the invoking user before writing files
//! - **Permissions:** capability detection and user guidance

pub mod device;
pub mod drm;
pub mod mapping;
pub mod permissions;
pub mod privileges;
pub mod source;

pub use device::{survey_devices, DeviceSurvey, DrmDevice, ScanoutBuffer};
pub use mapping::MappedBuffer;
pub use source::{KmsFrame, KmsSource};
