pub mod tensor;
pub mod stable;

pub use tensor::{IndexTensor, Tensor};
