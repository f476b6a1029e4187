//! SQL generation per driver.
//!
//! Statements are rendered once per entity when a persistence unit builds
//! its metamodel, then reused for every call.

use polystore_domain::entity::{ColumnMeta, ColumnType, EntityMeta, IdStrategy};

use crate::config::Driver;

impl Driver {
    fn quote(self, ident: &str) -> String {
        match self {
            Self::Sqlite => format!("\"{ident}\""),
            Self::MySql => format!("`{ident}`"),
        }
    }

    fn column_type(self, ty: ColumnType) -> &'static str {
        match (self, ty) {
            (Self::Sqlite, ColumnType::Integer) => "INTEGER",
            (Self::Sqlite, ColumnType::Real) => "REAL",
            (Self::Sqlite, ColumnType::Text) => "TEXT",
            (Self::MySql, ColumnType::Integer) => "BIGINT",
            (Self::MySql, ColumnType::Real) => "DOUBLE",
            (Self::MySql, ColumnType::Text) => "VARCHAR(255)",
        }
    }

    fn column_definition(self, meta: &EntityMeta, column: &ColumnMeta) -> String {
        let name = self.quote(column.name);
        let ty = self.column_type(column.ty);
        if column.name == meta.id_column {
            // SQLite generates keys for any INTEGER PRIMARY KEY.
            let generated = match (self, meta.id_strategy) {
                (Self::MySql, IdStrategy::Generated) => " AUTO_INCREMENT",
                _ => "",
            };
            format!("{name} {ty} NOT NULL PRIMARY KEY{generated}")
        } else if column.nullable {
            format!("{name} {ty}")
        } else {
            format!("{name} {ty} NOT NULL")
        }
    }
}

/// Pre-rendered statements for one entity on one driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Statements {
    pub create_table: String,
    pub drop_table: String,
    pub select_all: String,
    pub select_by_id: String,
    pub exists_by_id: String,
    /// Insert binding every column, id included.
    pub insert: String,
    /// Insert binding every column but the id.
    pub insert_generated: String,
    /// `None` when the entity has no column besides its id.
    pub update: Option<String>,
    pub delete_by_id: String,
    pub count: String,
}

impl Statements {
    pub(crate) fn render(driver: Driver, meta: &EntityMeta) -> Self {
        let table = driver.quote(meta.table);
        let id = driver.quote(meta.id_column);
        let all_columns = meta
            .columns
            .iter()
            .map(|col| driver.quote(col.name))
            .collect::<Vec<_>>();
        let value_columns = meta
            .columns
            .iter()
            .filter(|col| col.name != meta.id_column)
            .map(|col| driver.quote(col.name))
            .collect::<Vec<_>>();

        let definitions = meta
            .columns
            .iter()
            .map(|col| driver.column_definition(meta, col))
            .collect::<Vec<_>>()
            .join(", ");
        let select_list = all_columns.join(", ");

        let update = if value_columns.is_empty() {
            None
        } else {
            let assignments = value_columns
                .iter()
                .map(|col| format!("{col} = ?"))
                .collect::<Vec<_>>()
                .join(", ");
            Some(format!("UPDATE {table} SET {assignments} WHERE {id} = ?"))
        };

        Self {
            create_table: format!("CREATE TABLE IF NOT EXISTS {table} ({definitions})"),
            drop_table: format!("DROP TABLE IF EXISTS {table}"),
            select_all: format!("SELECT {select_list} FROM {table} ORDER BY {id}"),
            select_by_id: format!("SELECT {select_list} FROM {table} WHERE {id} = ?"),
            exists_by_id: format!("SELECT COUNT(*) FROM {table} WHERE {id} = ?"),
            insert: format!(
                "INSERT INTO {table} ({select_list}) VALUES ({})",
                placeholders(all_columns.len())
            ),
            insert_generated: format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                value_columns.join(", "),
                placeholders(value_columns.len())
            ),
            update,
            delete_by_id: format!("DELETE FROM {table} WHERE {id} = ?"),
            count: format!("SELECT COUNT(*) FROM {table}"),
        }
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use polystore_domain::accounts::User;
    use polystore_domain::entity::Entity;
    use polystore_domain::library::Book;

    #[test]
    fn should_render_sqlite_table_for_assigned_id() {
        let sql = Statements::render(Driver::Sqlite, Book::meta());
        assert_eq!(
            sql.create_table,
            "CREATE TABLE IF NOT EXISTS \"book\" (\"id\" INTEGER NOT NULL PRIMARY KEY, \
             \"name\" TEXT NOT NULL, \"price\" REAL NOT NULL)"
        );
    }

    #[test]
    fn should_render_mysql_auto_increment_for_generated_id() {
        let sql = Statements::render(Driver::MySql, User::meta());
        assert_eq!(
            sql.create_table,
            "CREATE TABLE IF NOT EXISTS `user` (`id` BIGINT NOT NULL PRIMARY KEY AUTO_INCREMENT, \
             `name` VARCHAR(255) NOT NULL, `age` BIGINT NOT NULL)"
        );
    }

    #[test]
    fn should_leave_id_out_of_generated_insert() {
        let sql = Statements::render(Driver::Sqlite, User::meta());
        assert_eq!(
            sql.insert_generated,
            "INSERT INTO \"user\" (\"name\", \"age\") VALUES (?, ?)"
        );
        assert_eq!(
            sql.insert,
            "INSERT INTO \"user\" (\"id\", \"name\", \"age\") VALUES (?, ?, ?)"
        );
    }

    #[test]
    fn should_bind_id_last_in_update() {
        let sql = Statements::render(Driver::MySql, Book::meta());
        assert_eq!(
            sql.update.as_deref(),
            Some("UPDATE `book` SET `name` = ?, `price` = ? WHERE `id` = ?")
        );
    }

    #[test]
    fn should_order_select_all_by_id() {
        let sql = Statements::render(Driver::Sqlite, Book::meta());
        assert_eq!(
            sql.select_all,
            "SELECT \"id\", \"name\", \"price\" FROM \"book\" ORDER BY \"id\""
        );
    }

    #[test]
    fn should_skip_update_for_id_only_entity() {
        static TAG: EntityMeta = EntityMeta {
            name: "Tag",
            namespace: "test::entity",
            table: "tag",
            columns: &[ColumnMeta::required("id", ColumnType::Integer)],
            id_column: "id",
            id_strategy: IdStrategy::Assigned,
        };
        assert_eq!(Statements::render(Driver::Sqlite, &TAG).update, None);
    }
}
