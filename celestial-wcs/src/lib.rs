pub mod coordinate;
pub mod distortion;
pub mod error;
pub mod header;
pub mod linear;
pub mod projection;
pub mod tan;

pub use coordinate::{IntermediateCoord, PixelCoord, SkyCoord};
pub use distortion::{SipDistortion, SipMatrix};
pub use error::{WcsError, WcsResult};
pub use header::{KeywordMap, KeywordProvider};
pub use linear::LinearTransform;
pub use tan::{Frame, SkyTransform, TanWcs};
