pub mod bitmap;
pub mod datatype;
pub mod scalar;
pub mod validity;
