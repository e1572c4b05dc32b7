/// Number of read-receipt writes issued per batch in `mark_as_read`.
pub const READ_RECEIPT_CHUNK: usize = 10;

/// Tolerance when matching the newest read message against the
/// conversation's denormalized `last_message` summary timestamp.
pub const LAST_MESSAGE_TOLERANCE_MS: i64 = 2_000;

/// Participant count required for a direct conversation.
pub const DIRECT_PARTICIPANTS: usize = 2;

/// Minimum participant count for a group conversation.
pub const GROUP_MIN_PARTICIPANTS: usize = 3;

/// Maximum length of a push notification body before truncation.
pub const MAX_PUSH_BODY_CHARS: usize = 140;
