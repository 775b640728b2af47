//! Temporarily assuming the invoking user's identity.
//!
//! Reading scanout memory needs root (or a setuid binary), but the image file
//! must belong to whoever ran the tool.

use std::io;

use kmsgrab_common::error::{KmsgrabError, KmsgrabResult};
use kmsgrab_platform_core::PrivilegeScope;

/// Switch the effective user and group to the real ones.
///
/// The returned scope switches back when dropped, so a daemon can reopen the
/// device for the next capture. When real and effective ids already match
/// nothing changes.
pub fn enter_unprivileged() -> KmsgrabResult<PrivilegeScope> {
    // SAFETY: these getters have no preconditions and cannot fail.
    let (uid, euid, gid, egid) = unsafe {
        (
            libc::getuid(),
            libc::geteuid(),
            libc::getgid(),
            libc::getegid(),
        )
    };

    if uid == euid && gid == egid {
        return Ok(PrivilegeScope::unchanged());
    }

    // Group first: once the effective uid is unprivileged we may no longer
    // change it.
    // SAFETY: plain syscall wrappers.
    if unsafe { libc::setegid(gid) } != 0 {
        return Err(KmsgrabError::privilege(format!(
            "setegid({gid}) failed: {}",
            io::Error::last_os_error()
        )));
    }
    if unsafe { libc::seteuid(uid) } != 0 {
        let err = io::Error::last_os_error();
        // SAFETY: restoring the group we started with.
        unsafe { libc::setegid(egid) };
        return Err(KmsgrabError::privilege(format!("seteuid({uid}) failed: {err}")));
    }

    tracing::debug!(uid, gid, previous_euid = euid, "Dropped to invoking user");

    Ok(PrivilegeScope::with_restore(move || {
        // SAFETY: the saved set-user-ID still holds `euid`, so switching back
        // is permitted.
        if unsafe { libc::seteuid(euid) } != 0 {
            tracing::warn!(euid, error = %io::Error::last_os_error(), "Failed to restore effective uid");
        }
        if unsafe { libc::setegid(egid) } != 0 {
            tracing::warn!(egid, error = %io::Error::last_os_error(), "Failed to restore effective gid");
        }
    }))
}
