//! Protocol constants and observed rig defaults

/// Distance value reserved for an anchor that produced no reading
pub const INVALID_DISTANCE: f64 = -1.0;

/// Frame terminator on the inbound ranging stream
pub const FRAME_TERMINATOR: u8 = b'\n';

/// Minimum number of valid ranges needed for a 3D fix
pub const MIN_ANCHORS_FOR_FIX: usize = 3;

/// Anchor table of the reference rig (device units)
pub const DEFAULT_ANCHORS: [[f64; 3]; 6] = [
    [452.0, 190.0, 160.0],
    [0.0, 80.0, 160.0],
    [2.0, 287.0, 160.0],
    [4.0, 493.0, 160.0],
    [295.0, 570.0, 160.0],
    [289.0, 0.0, 160.0],
];

/// Solver starting point, deliberately below the anchor plane
pub const DEFAULT_INITIAL_GUESS: [f64; 3] = [150.0, 100.0, 50.0];

pub const DEFAULT_POLL_PERIOD_MS: u64 = 50;
pub const DEFAULT_SMOOTHING_ALPHA: f64 = 0.5;
pub const DEFAULT_MAX_INVALID_ANCHORS: usize = 2;
pub const DEFAULT_MAX_FRAME_LEN: usize = 512;
pub const DEFAULT_BAUD_RATE: u32 = 460_800;
