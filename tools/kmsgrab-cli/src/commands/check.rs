//! Check devices, planes, and privileges.

use kmsgrab_common::config::CaptureDefaults;
use kmsgrab_platform_linux::permissions::{check_capabilities, print_capability_report};
use kmsgrab_platform_linux::survey_devices;

pub fn run(defaults: &CaptureDefaults) -> anyhow::Result<()> {
    println!("kmsgrab System Check");
    println!("{}", "=".repeat(50));

    let surveys = survey_devices(&defaults.device_dir, defaults.max_cards);
    if surveys.is_empty() {
        println!(
            "[WARN] No card nodes under {}",
            defaults.device_dir.display()
        );
    }

    for survey in &surveys {
        if let Some(ref error) = survey.error {
            println!("[WARN] {}: {error}", survey.path.display());
            continue;
        }

        let active: Vec<_> = survey.planes.iter().filter(|p| p.is_active()).collect();
        println!(
            "[OK] {}: dumb buffers {}, {} planes ({} active)",
            survey.path.display(),
            if survey.dumb_buffers { "yes" } else { "no" },
            survey.planes.len(),
            active.len()
        );
        for plane in active {
            println!(
                "     plane {} -> fb {} on crtc {}",
                plane.plane_id, plane.fb_id, plane.crtc_id
            );
        }
    }

    let capabilities = check_capabilities(&defaults.device_dir, defaults.max_cards);
    println!();
    print_capability_report(&capabilities);

    let all_required_ok = capabilities
        .iter()
        .filter(|c| c.required)
        .all(|c| c.available);

    println!();
    if all_required_ok {
        println!("All required capabilities are available. kmsgrab is ready.");
    } else {
        println!("Some required capabilities are missing. See above for fixes.");
    }

    Ok(())
}
