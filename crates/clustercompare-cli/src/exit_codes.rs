//! Process exit codes (§4.H, §4.L, §7): `0`/`1` are comparison outcomes,
//! everything `>= 2` is an infrastructure failure.

pub const SUCCESS: i32 = 0;
pub const DRIFT_DETECTED: i32 = 1;

pub const FETCH_ERROR: i32 = 2;
pub const LOAD_ERROR: i32 = 3;
pub const OVERRIDE_ERROR: i32 = 4;
pub const DIFF_ERROR: i32 = 5;
pub const CLUSTER_ERROR: i32 = 6;
pub const IO_ERROR: i32 = 7;

pub const USAGE_ERROR: i32 = 64;
