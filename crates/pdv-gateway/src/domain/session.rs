//! Browser session identity.

use uuid::Uuid;

/// Identifies one browser channel (device registration or media viewing)
/// for its whole lifetime.
///
/// Random v4 UUIDs are used so identities are never reused across
/// reconnects, which keeps stale teardown work from touching a new session.
pub type SessionId = Uuid;

/// Allocates a fresh session identity.
pub fn new_session_id() -> SessionId {
    Uuid::new_v4()
}
