// SPDX-FileCopyrightText: 2025 Contributors to the gst-gev project.
// SPDX-License-Identifier: Apache-2.0

//! Dynamic loading of the GigE-V shared library.

use std::{ffi::OsStr, sync::Arc};

use crate::Result;

pub use gev_sys::GevApi;

/// Shared handle to the loaded function table.
///
/// The library stays mapped for as long as any clone of the handle is alive.
pub(crate) type GevApiHandle = Arc<GevApi>;

/// Loads the GigE-V library from `path` and resolves its entry points.
///
/// # Errors
///
/// Returns [`crate::Error::LibLoading`] if the library or one of its symbols
/// cannot be found.
///
/// # Examples
///
/// ```no_run
/// use gev::{load_api, config::get_gev_so_path};
///
/// # fn main() -> Result<(), gev::Error> {
/// let api = load_api(get_gev_so_path())?;
/// # Ok(())
/// # }
/// ```
pub fn load_api(path: impl AsRef<OsStr>) -> Result<Arc<GevApi>> {
    // SAFETY: loading runs the library's initializers; the GigE-V SDK has none
    // that depend on process state beyond the dynamic linker.
    let api = unsafe { GevApi::new(path)? };
    Ok(Arc::new(api))
}
