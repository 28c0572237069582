use crate::cli::SqlArgs;
use adminorm::qb::{InsertQb, SelectQb};
use adminorm::{EntityMapping, Value};

pub fn run(args: SqlArgs) -> anyhow::Result<()> {
    let catalog = crate::load_catalog(&args.config)?;
    let entity = catalog.entity(&args.entity)?;
    for (label, sql) in statements(entity)? {
        println!("-- {label}\n{sql};\n");
    }
    Ok(())
}

/// Default statements a builder composes for `entity`: a plain select, its
/// count, and an insert of every field returning the primary key.
fn statements(entity: &EntityMapping) -> anyhow::Result<Vec<(&'static str, String)>> {
    let select = SelectQb::new(entity.table());
    let (select_sql, _) = select.build()?;
    let (count_sql, _) = select.build_count()?;

    let mut insert = InsertQb::new(entity.table());
    for field in entity.fields() {
        insert = if field.autoincrement {
            insert.default(&field.name)
        } else {
            insert.value(&field.name, Value::Null)
        };
    }
    if let Some(primary) = entity.primary() {
        insert = insert.returning(&primary.name);
    }
    let (insert_sql, _) = insert.build()?;

    Ok(vec![
        ("select", select_sql),
        ("count", count_sql),
        ("insert", insert_sql),
    ])
}
