//! USB device arbiter: serializes exclusive access to physical turntable /
//! tuner hardware so two sources never claim the same device.

use std::collections::HashMap;

use crate::source_id::SourceId;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ArbiterError {
    #[error("device '{0}' is already reserved")]
    AlreadyReserved(String),
    #[error("device '{0}' is not owned by the releasing caller")]
    NotOwner(String),
}

/// Tracks which `SourceId` currently owns each named device path. Reserve
/// is exclusive; release is idempotent so a source's teardown path never
/// has to check who owns what first.
#[derive(Debug, Default)]
pub struct UsbArbiter {
    owners: parking_lot::Mutex<HashMap<String, SourceId>>,
}

impl UsbArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&self, device: &str, owner: SourceId) -> Result<(), ArbiterError> {
        let mut owners = self.owners.lock();
        if let Some(existing) = owners.get(device) {
            if *existing != owner {
                return Err(ArbiterError::AlreadyReserved(device.to_string()));
            }
            return Ok(());
        }
        owners.insert(device.to_string(), owner);
        Ok(())
    }

    /// Releasing a device that isn't reserved, or re-releasing one you
    /// already gave up, is an idempotent no-op. Releasing a device another
    /// owner currently holds is rejected with `NotOwner` rather than
    /// silently discarding someone else's reservation.
    pub fn release(&self, device: &str, owner: &SourceId) -> Result<(), ArbiterError> {
        let mut owners = self.owners.lock();
        match owners.get(device) {
            Some(existing) if existing == owner => {
                owners.remove(device);
                Ok(())
            }
            Some(_) => Err(ArbiterError::NotOwner(device.to_string())),
            None => Ok(()),
        }
    }

    /// Releases every device held by `owner`, used on source disposal.
    pub fn release_all(&self, owner: &SourceId) {
        let mut owners = self.owners.lock();
        owners.retain(|_, held_by| held_by != owner);
    }

    pub fn in_use(&self, device: &str) -> bool {
        self.owners.lock().contains_key(device)
    }

    pub fn owner_of(&self, device: &str) -> Option<SourceId> {
        self.owners.lock().get(device).cloned()
    }

    pub fn list(&self) -> Vec<(String, SourceId)> {
        self.owners
            .lock()
            .iter()
            .map(|(d, s)| (d.clone(), s.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::SourceKind;
    use crate::source_id::SourceIdGenerator;

    #[test]
    fn second_reservation_conflicts() {
        let arbiter = UsbArbiter::new();
        let gen = SourceIdGenerator::new();
        let a = gen.next(SourceKind::Vinyl);
        let b = gen.next(SourceKind::Vinyl);
        arbiter.reserve("usb-turntable-0", a.clone()).unwrap();
        assert!(arbiter.reserve("usb-turntable-0", b).is_err());
        assert!(arbiter.in_use("usb-turntable-0"));
    }

    #[test]
    fn release_is_idempotent() {
        let arbiter = UsbArbiter::new();
        let gen = SourceIdGenerator::new();
        let a = gen.next(SourceKind::Vinyl);
        assert!(arbiter.release("usb-turntable-0", &a).is_ok());
        arbiter.reserve("usb-turntable-0", a.clone()).unwrap();
        assert!(arbiter.release("usb-turntable-0", &a).is_ok());
        assert!(arbiter.release("usb-turntable-0", &a).is_ok());
        assert!(!arbiter.in_use("usb-turntable-0"));
    }

    #[test]
    fn same_owner_can_reserve_again() {
        let arbiter = UsbArbiter::new();
        let gen = SourceIdGenerator::new();
        let a = gen.next(SourceKind::Vinyl);
        arbiter.reserve("usb-turntable-0", a.clone()).unwrap();
        assert!(arbiter.reserve("usb-turntable-0", a).is_ok());
    }

    #[test]
    fn release_by_non_owner_is_rejected() {
        let arbiter = UsbArbiter::new();
        let gen = SourceIdGenerator::new();
        let a = gen.next(SourceKind::Vinyl);
        let b = gen.next(SourceKind::Vinyl);
        arbiter.reserve("usb-turntable-0", a.clone()).unwrap();
        assert!(matches!(
            arbiter.release("usb-turntable-0", &b),
            Err(ArbiterError::NotOwner(_))
        ));
        assert!(arbiter.in_use("usb-turntable-0"));
        assert!(arbiter.release("usb-turntable-0", &a).is_ok());
        assert!(arbiter.reserve("usb-turntable-0", b).is_ok());
    }
}
