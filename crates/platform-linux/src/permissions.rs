//! Capability detection and guidance for KMS capture.
//!
//! Grabbing the scanout buffer needs an accessible DRM card node, a device
//! with dumb buffer support, an active plane, and enough privilege for the
//! kernel to hand out buffer handles.

use std::path::Path;

use crate::device::{card_path, survey_devices, DeviceSurvey};

/// A system capability that kmsgrab may need.
#[derive(Debug, Clone)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub available: bool,
    pub required: bool,
    pub fix_instructions: Option<String>,
}

/// Check all capabilities and report status.
pub fn check_capabilities(device_dir: &Path, max_cards: u32) -> Vec<Capability> {
    let surveys = survey_devices(device_dir, max_cards);
    vec![
        check_device_nodes(device_dir, &surveys),
        check_dumb_buffer_device(&surveys),
        check_active_plane(&surveys),
        check_handle_privilege(),
    ]
}

fn check_device_nodes(device_dir: &Path, surveys: &[DeviceSurvey]) -> Capability {
    let exists = card_path(device_dir, 0).exists();
    let openable = surveys.iter().any(|s| s.error.is_none());

    Capability {
        name: "DRM Device Access".to_string(),
        description: format!("Read-write access to {}/card*", device_dir.display()),
        available: exists && openable,
        required: true,
        fix_instructions: if !exists {
            Some("No KMS card node found; load the GPU's kernel modesetting driver".to_string())
        } else if !openable {
            Some("Run as root, or add the user to the 'video' group".to_string())
        } else {
            None
        },
    }
}

fn check_dumb_buffer_device(surveys: &[DeviceSurvey]) -> Capability {
    let available = surveys.iter().any(|s| s.dumb_buffers);

    Capability {
        name: "Dumb Buffer Support".to_string(),
        description: "A card that can allocate linear scanout buffers".to_string(),
        available,
        required: true,
        fix_instructions: if available {
            None
        } else {
            Some("Render-only GPUs cannot be captured; use the card driving the display".to_string())
        },
    }
}

fn check_active_plane(surveys: &[DeviceSurvey]) -> Capability {
    let available = surveys
        .iter()
        .filter(|s| s.dumb_buffers)
        .any(|s| s.planes.iter().any(|p| p.is_active()));

    Capability {
        name: "Active Scanout Plane".to_string(),
        description: "A plane with a framebuffer bound to a CRTC".to_string(),
        available,
        required: true,
        fix_instructions: if available {
            None
        } else {
            Some("Make sure a display is connected and not blanked".to_string())
        },
    }
}

fn check_handle_privilege() -> Capability {
    // SAFETY: geteuid has no preconditions.
    let euid = unsafe { libc::geteuid() };
    let available = euid == 0;

    Capability {
        name: "Buffer Handle Privilege".to_string(),
        description: "Root or CAP_SYS_ADMIN, required for the kernel to expose buffer handles"
            .to_string(),
        available,
        required: true,
        fix_instructions: if available {
            None
        } else {
            Some(
                "Run with sudo, or install setuid root: sudo chown root kmsgrab && sudo chmod u+s kmsgrab"
                    .to_string(),
            )
        },
    }
}

/// Print a user-friendly capability report.
pub fn print_capability_report(capabilities: &[Capability]) {
    println!("kmsgrab System Capabilities:");
    println!("{}", "-".repeat(60));

    for cap in capabilities {
        let status = if cap.available {
            "[OK]"
        } else if cap.required {
            "[MISSING - REQUIRED]"
        } else {
            "[MISSING - OPTIONAL]"
        };

        println!("  {} {}: {}", status, cap.name, cap.description);

        if let Some(ref fix) = cap.fix_instructions {
            println!("    Fix: {fix}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_device_dir_reports_missing_required_capabilities() {
        let dir = tempfile::tempdir().unwrap();
        let caps = check_capabilities(dir.path(), 4);

        assert_eq!(caps.len(), 4);
        let device = &caps[0];
        assert!(!device.available);
        assert!(device.required);
        assert!(device.fix_instructions.is_some());

        assert!(!caps[1].available);
        assert!(!caps[2].available);
    }
}
