//! 实体模块

mod product_mapping;
mod source_product;

pub use product_mapping::ProductMapping;
pub use source_product::SourceProduct;
