use crate::cli::CheckArgs;
use adminorm::{Builder, Catalog, EntityMapping};
use anyhow::Context;
use comfy_table::{Attribute, Cell, ContentArrangement, Table, presets::UTF8_FULL};

pub async fn run(args: CheckArgs) -> anyhow::Result<()> {
    let catalog = crate::load_catalog(&args.config)?;
    println!("{}", summary_table(&catalog));

    if args.live {
        let url = match args.database {
            Some(url) => url,
            None => std::env::var("DATABASE_URL")
                .context("--live needs --database or DATABASE_URL")?,
        };
        let pool = adminorm::create_pool(&url)?;
        let client = pool.get().await.context("failed to connect")?;

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Entity").add_attribute(Attribute::Bold),
                Cell::new("Rows").add_attribute(Attribute::Bold),
            ]);
        for entity in catalog.entities() {
            let mut builder = Builder::new(&catalog, entity.name(), &client)?;
            let rows = builder
                .count()
                .await
                .with_context(|| format!("failed to count {}", entity.table()))?;
            table.add_row(vec![entity.name().to_string(), rows.to_string()]);
        }
        println!("{table}");
    }

    println!(
        "ok: {} entities in {}",
        catalog.len(),
        args.config.display()
    );
    Ok(())
}

fn summary_row(entity: &EntityMapping) -> Vec<String> {
    let edges: usize = entity
        .dependent_fields()
        .map(|f| f.dependencies.len())
        .sum();
    vec![
        entity.name().to_string(),
        entity.table().to_string(),
        entity.fields().len().to_string(),
        entity
            .primary()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "-".to_string()),
        entity.file_fields().count().to_string(),
        entity.relations().len().to_string(),
        edges.to_string(),
    ]
}

pub(crate) fn summary_table(catalog: &Catalog) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            [
                "Entity",
                "Table",
                "Fields",
                "Primary",
                "Files",
                "Relations",
                "Dependencies",
            ]
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );
    for entity in catalog.entities() {
        table.add_row(summary_row(entity));
    }
    table
}
