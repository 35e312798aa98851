//! Exit codes for the CLI.
//!
//! These follow common Unix conventions so scripts can tell a bad image
//! apart from a missing path.

/// Successful execution
pub const SUCCESS: u8 = 0;

/// General/unspecified error
pub const GENERAL_ERROR: u8 = 1;

/// Command-line usage error (bad arguments, bad config)
pub const USAGE_ERROR: u8 = 2;

/// Title key could not be recovered
pub const KEY_FAILED: u8 = 3;

/// Not a Wii disc, or a structure on it is malformed
pub const IMAGE_INVALID: u8 = 4;

/// Permission denied reading the image or writing output
pub const PERMISSION_DENIED: u8 = 5;

/// Mount was rejected before the image was read
pub const MOUNT_FAILED: u8 = 6;

/// File or directory not found (image file or path on the disc)
pub const NOT_FOUND: u8 = 7;

/// Operation cancelled or interrupted
pub const CANCELLED: u8 = 8;
