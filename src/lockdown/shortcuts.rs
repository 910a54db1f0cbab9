use std::sync::Arc;

use log::{debug, info, warn};

use crate::error::{HostError, LookawayError};

/// Reserved chord that always forces an emergency exit.
pub const EMERGENCY_CHORD: &str = "CommandOrControl+Shift+B";

/// Chords swallowed while a lockdown is active.
pub const SUPPRESSED_CHORDS: [&str; 3] = ["CommandOrControl+Q", "CommandOrControl+W", "Alt+F4"];

pub type ShortcutHandler = Arc<dyn Fn() + Send + Sync>;

/// Host-side global shortcut registry.
pub trait ShortcutRegistrar: Send + Sync {
    fn register(&self, chord: &str, handler: ShortcutHandler) -> Result<(), HostError>;

    fn unregister(&self, chord: &str);

    fn is_registered(&self, chord: &str) -> bool;
}

/// Owns the suppression set and the permanent emergency chord.
pub struct ShortcutTable {
    registrar: Arc<dyn ShortcutRegistrar>,
    emergency: ShortcutHandler,
    suppressed: Vec<&'static str>,
}

impl ShortcutTable {
    pub fn new(registrar: Arc<dyn ShortcutRegistrar>, emergency: ShortcutHandler) -> Self {
        Self {
            registrar,
            emergency,
            suppressed: Vec::new(),
        }
    }

    /// Registers the emergency chord if it is not already registered.
    pub fn install_emergency(&self) -> Result<(), LookawayError> {
        if self.registrar.is_registered(EMERGENCY_CHORD) {
            return Ok(());
        }

        self.registrar
            .register(EMERGENCY_CHORD, self.emergency.clone())
            .map_err(|err| LookawayError::ShortcutRegister {
                chord: EMERGENCY_CHORD.to_string(),
                reason: err.to_string(),
            })?;
        info!("Emergency exit shortcut registered: {EMERGENCY_CHORD}");
        Ok(())
    }

    pub fn emergency_registered(&self) -> bool {
        self.registrar.is_registered(EMERGENCY_CHORD)
    }

    /// Best-effort: a chord that fails to register is logged and skipped.
    /// Returns how many chords are now suppressed.
    pub fn suppress(&mut self) -> usize {
        for chord in SUPPRESSED_CHORDS {
            if self.suppressed.contains(&chord) {
                continue;
            }

            let handler: ShortcutHandler = Arc::new(move || debug!("Blocked shortcut: {chord}"));
            match self.registrar.register(chord, handler) {
                Ok(()) => self.suppressed.push(chord),
                Err(err) => {
                    let err = LookawayError::ShortcutRegister {
                        chord: chord.to_string(),
                        reason: err.to_string(),
                    };
                    warn!("{err}; continuing without it");
                }
            }
        }
        self.suppressed.len()
    }

    /// Drops the suppression set and makes sure the emergency chord survived.
    pub fn release(&mut self) {
        for chord in self.suppressed.drain(..) {
            self.registrar.unregister(chord);
        }

        if let Err(err) = self.install_emergency() {
            warn!("{err}; emergency exit unavailable until next lockdown exit");
        }
    }

    pub fn suppressed(&self) -> &[&'static str] {
        &self.suppressed
    }

    /// Process teardown: unregisters everything including the emergency chord.
    pub fn uninstall(&mut self) {
        for chord in self.suppressed.drain(..) {
            self.registrar.unregister(chord);
        }
        self.registrar.unregister(EMERGENCY_CHORD);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryHost;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn table(host: &Arc<InMemoryHost>, hits: &Arc<AtomicUsize>) -> ShortcutTable {
        let hits = hits.clone();
        ShortcutTable::new(
            host.clone(),
            Arc::new(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn suppress_and_release_keep_emergency_chord() {
        let host = Arc::new(InMemoryHost::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let mut shortcuts = table(&host, &hits);
        shortcuts.install_emergency().unwrap();

        assert_eq!(shortcuts.suppress(), SUPPRESSED_CHORDS.len());
        assert!(SUPPRESSED_CHORDS.iter().all(|c| host.is_registered(c)));

        // Suppressed chords are swallowed.
        assert!(host.press(SUPPRESSED_CHORDS[0]));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        shortcuts.release();
        assert!(SUPPRESSED_CHORDS.iter().all(|c| !host.is_registered(c)));
        assert!(shortcuts.emergency_registered());

        assert!(host.press(EMERGENCY_CHORD));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_suppression_chord_is_skipped() {
        let host = Arc::new(InMemoryHost::new());
        host.reject_chord("Alt+F4");
        let hits = Arc::new(AtomicUsize::new(0));
        let mut shortcuts = table(&host, &hits);

        assert_eq!(shortcuts.suppress(), 2);
        assert!(!host.is_registered("Alt+F4"));
    }

    #[test]
    fn emergency_failure_is_surfaced() {
        let host = Arc::new(InMemoryHost::new());
        host.reject_chord(EMERGENCY_CHORD);
        let hits = Arc::new(AtomicUsize::new(0));
        let shortcuts = table(&host, &hits);

        let err = shortcuts.install_emergency().unwrap_err();
        assert!(matches!(err, LookawayError::ShortcutRegister { .. }));
        assert!(!shortcuts.emergency_registered());
    }
}
