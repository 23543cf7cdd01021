/// Photo handling module
///
/// This module handles:
/// - Raw file selections and their declared media types
/// - Immediate previews of a selection
/// - Bounded resize + JPEG re-encode before storage

pub mod codec;
pub mod source;

pub use codec::{CompressedImage, ImageCodec, ImageLimits};
pub use source::RawImage;
