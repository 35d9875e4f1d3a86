//! Host focus/do-not-disturb detection.

/// Seam for checking whether the host's focus/DND mode is active.
///
/// The dispatcher only consults this when the configuration opts into
/// respecting DND; tests substitute a stub.
pub trait FocusProbe: Send {
    fn focus_active(&self) -> bool;
}

/// Probes the host notification center for its DND flag.
pub struct SystemFocusProbe;

impl FocusProbe for SystemFocusProbe {
    #[cfg(target_os = "macos")]
    fn focus_active(&self) -> bool {
        // Notification Center exposes the DND flag through its defaults
        // domain; absence of the key reads as "off".
        std::process::Command::new("defaults")
            .args(["read", "com.apple.notificationcenterui", "doNotDisturb"])
            .output()
            .ok()
            .map(|out| String::from_utf8_lossy(&out.stdout).trim() == "1")
            .unwrap_or(false)
    }

    #[cfg(not(target_os = "macos"))]
    fn focus_active(&self) -> bool {
        // No portable DND signal on other platforms.
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_probe_does_not_panic() {
        // Whatever the host state, probing must be infallible.
        let _ = SystemFocusProbe.focus_active();
    }
}
