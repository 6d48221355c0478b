//! Administrative authority and emergency pause.
//!
//! Each engine holds an [`Authority`] built from the admin identity injected
//! at construction. The admin may pause and resume the engine; every
//! state-mutating entry point calls [`Authority::ensure_operational`] first.

use serde::{Deserialize, Serialize};

use crate::Address;

/// Error types for authority checks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorityError {
    /// The caller is not the configured admin.
    #[error("caller {} is not the admin", crate::identity::short_hex(.0))]
    Unauthorized(Address),

    /// The engine is paused.
    #[error("engine is paused")]
    Paused,
}

/// Admin identity plus pause flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authority {
    admin: Address,
    paused: bool,
}

impl Authority {
    /// Create an unpaused authority for the given admin.
    pub fn new(admin: Address) -> Self {
        Self {
            admin,
            paused: false,
        }
    }

    /// Fail unless `caller` is the admin.
    pub fn ensure_admin(&self, caller: &Address) -> Result<(), AuthorityError> {
        if caller != &self.admin {
            return Err(AuthorityError::Unauthorized(*caller));
        }
        Ok(())
    }

    /// Fail while paused.
    pub fn ensure_operational(&self) -> Result<(), AuthorityError> {
        if self.paused {
            return Err(AuthorityError::Paused);
        }
        Ok(())
    }

    /// Pause the engine. Admin only; pausing twice is a no-op.
    pub fn pause(&mut self, caller: &Address) -> Result<(), AuthorityError> {
        self.ensure_admin(caller)?;
        tracing::warn!("authority: engine paused");
        self.paused = true;
        Ok(())
    }

    /// Resume the engine. Admin only.
    pub fn resume(&mut self, caller: &Address) -> Result<(), AuthorityError> {
        self.ensure_admin(caller)?;
        tracing::info!("authority: engine resumed");
        self.paused = false;
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn admin(&self) -> &Address {
        &self.admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIN: Address = [0xAA; 32];
    const OTHER: Address = [0x01; 32];

    #[test]
    fn test_new_authority_operational() {
        let auth = Authority::new(ADMIN);
        assert!(!auth.is_paused());
        auth.ensure_operational().expect("should be operational");
        assert_eq!(auth.admin(), &ADMIN);
    }

    #[test]
    fn test_pause_and_resume() {
        let mut auth = Authority::new(ADMIN);
        auth.pause(&ADMIN).expect("admin pause");
        assert!(auth.is_paused());
        assert_eq!(auth.ensure_operational(), Err(AuthorityError::Paused));

        auth.resume(&ADMIN).expect("admin resume");
        assert!(!auth.is_paused());
        auth.ensure_operational().expect("operational again");
    }

    #[test]
    fn test_non_admin_cannot_pause() {
        let mut auth = Authority::new(ADMIN);
        let err = auth.pause(&OTHER).expect_err("non-admin pause");
        assert_eq!(err, AuthorityError::Unauthorized(OTHER));
        assert!(!auth.is_paused());
    }

    #[test]
    fn test_non_admin_cannot_resume() {
        let mut auth = Authority::new(ADMIN);
        auth.pause(&ADMIN).expect("pause");
        assert!(auth.resume(&OTHER).is_err());
        assert!(auth.is_paused());
    }
}
