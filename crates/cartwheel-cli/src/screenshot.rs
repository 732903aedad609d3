use cartwheel_session::video::FrameBuffer;
use std::io;
use std::path::Path;

/// Writes the framebuffer as an 8-bit RGBA PNG.
pub fn write_png(path: &Path, frame: &FrameBuffer) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let geometry = frame.geometry();
    let file = std::fs::File::create(path)?;
    let w = io::BufWriter::new(file);
    let mut encoder = png::Encoder::new(w, geometry.width as u32, geometry.height as u32);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().map_err(io::Error::other)?;
    writer
        .write_image_data(frame.pixels())
        .map_err(io::Error::other)?;
    writer.finish().map_err(io::Error::other)
}
