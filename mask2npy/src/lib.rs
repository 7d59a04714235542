//! Convert binary PNG segmentation masks into contour annotation `.npy` files

pub mod annotation;
pub mod binarize;
pub mod driver;
pub mod export_npy;
pub mod export_svg;
pub mod loading;
pub mod npy;
pub mod overlay;
pub mod pickle;
pub mod pipeline;
pub mod tracing;

pub use export_npy::{default_output_path, load_annotations, save_annotation, LoadedAnnotations};
pub use pipeline::{convert_mask_to_npy, ConvertOptions};
