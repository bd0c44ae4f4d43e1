//! Content-type driven conversion of bodies to and from typed values.

mod media_type;
mod registry;

pub use media_type::MediaType;
pub(crate) use media_type::describe;
pub use registry::{
    ConverterDescriptor, ConverterRegistry, CustomDecoder, Format, Predicate, TargetKind,
};
