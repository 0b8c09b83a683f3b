use std::ffi::c_void;

/// Opaque tube handle returned by `tube_new*` / `tube_from_fd`.
pub type TubeHandle = *mut c_void;

/// Default forward buffer size used by `tube_new_default`.
pub const TUBE_DEFAULT_BUFFER_SIZE: usize = tubeprims_transport::DEFAULT_SOCKET_BUFFER_SIZE;
