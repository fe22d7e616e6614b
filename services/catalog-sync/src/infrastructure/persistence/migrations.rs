//! 数据库迁移

use stockbridge_adapter_postgres::Migration;

/// 服务的全部迁移，按版本号升序
pub fn migrations() -> Vec<Migration> {
    vec![
        Migration::new(
            1,
            "create_product_mappings",
            include_str!("../../../migrations/0001_create_product_mappings.sql"),
        ),
        Migration::new(
            2,
            "forbid_mapping_delete",
            include_str!("../../../migrations/0002_forbid_mapping_delete.sql"),
        ),
    ]
}
