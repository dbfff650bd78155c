//! # GOP for the Kernel

use kernel_info::boot::GraphicsInfo;
use log::debug;
use uefi::boot::{self, OpenProtocolAttributes, OpenProtocolParams, ScopedProtocol};
use uefi::proto::console::gop::GraphicsOutput;
use uefi::Status;

/// Describes the mode the firmware left active. The mode is never changed.
///
/// # Errors
/// Fails if no Graphics Output Protocol is installed or it cannot be opened.
pub fn active_display_mode() -> Result<GraphicsInfo, Status> {
    let mut gop = get_gop()?;

    let mode = gop.current_mode_info();
    let (width, height) = mode.resolution();
    let stride = mode.stride();
    debug!("GOP mode {width}x{height}, stride {stride}, {:?}", mode.pixel_format());

    let mut fb = gop.frame_buffer();
    let base = fb.as_mut_ptr().expose_provenance() as u64;
    let size = fb.size() as u64;

    let narrow = |v: usize| u32::try_from(v).map_err(|_| Status::UNSUPPORTED);
    Ok(GraphicsInfo {
        framebuffer_base: base,
        framebuffer_size: size,
        vertical_resolution: narrow(height)?,
        horizontal_resolution: narrow(width)?,
        pixels_per_scan_line: narrow(stride)?,
    })
}

fn get_gop() -> Result<ScopedProtocol<GraphicsOutput>, Status> {
    let handle = boot::get_handle_for_protocol::<GraphicsOutput>().map_err(|e| e.status())?;
    let params = OpenProtocolParams {
        handle,
        agent: boot::image_handle(),
        controller: None,
    };

    // Opened shared so the console driver stays connected.
    // SAFETY: The mode is only read, and nothing else changes it while the
    // loader runs.
    let gop = unsafe { boot::open_protocol::<GraphicsOutput>(params, OpenProtocolAttributes::GetProtocol) };
    gop.map_err(|e| e.status())
}
