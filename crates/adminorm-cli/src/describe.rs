use crate::cli::DescribeArgs;
use adminorm::{DefaultValue, EntityMapping, FieldMapping};
use comfy_table::{Attribute, Cell, ContentArrangement, Table, presets::UTF8_FULL};

pub fn run(args: DescribeArgs) -> anyhow::Result<()> {
    let catalog = crate::load_catalog(&args.config)?;
    let entity = catalog.entity(&args.entity)?;

    println!("{} (table {})", entity.name(), entity.table());
    println!("{}", fields_table(entity));
    if !entity.relations().is_empty() {
        println!("{}", relations_table(entity));
    }
    Ok(())
}

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
        .collect()
}

fn flag(on: bool) -> &'static str {
    if on { "yes" } else { "" }
}

fn default_text(field: &FieldMapping) -> String {
    match &field.default {
        Some(DefaultValue::Now) => "NOW".to_string(),
        Some(DefaultValue::Literal(value)) => value.to_string(),
        None => String::new(),
    }
}

fn file_text(field: &FieldMapping) -> String {
    let Some(spec) = &field.file else {
        return String::new();
    };
    let mut parts = vec![spec.storage_path.display().to_string()];
    if let Some((w, h)) = spec.bounds() {
        let mode = if spec.exact_dimensions { "exact" } else { "max" };
        parts.push(format!("{mode} {w}x{h}"));
    }
    if spec.resize_allowed {
        parts.push("resize".to_string());
    }
    if let Some(kb) = spec.max_size_kb {
        parts.push(format!("<= {kb} KB"));
    }
    if !spec.allowed_formats.is_empty() {
        parts.push(spec.allowed_formats.join("/"));
    }
    parts.join(", ")
}

fn field_row(field: &FieldMapping) -> Vec<String> {
    let depends: Vec<String> = field
        .dependencies
        .iter()
        .map(|edge| format!("{}({})", edge.entity, edge.fields.join(", ")))
        .collect();
    vec![
        field.name.clone(),
        field.field_type.to_string(),
        flag(field.primary).to_string(),
        flag(field.autoincrement).to_string(),
        flag(field.mandatory).to_string(),
        default_text(field),
        field
            .date_pattern
            .map(|p| p.to_string())
            .unwrap_or_default(),
        file_text(field),
        depends.join(", "),
    ]
}

pub(crate) fn fields_table(entity: &EntityMapping) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header(&[
            "Field",
            "Type",
            "Primary",
            "Auto",
            "Mandatory",
            "Default",
            "Pattern",
            "File",
            "Referenced by",
        ]));
    for field in entity.fields() {
        table.add_row(field_row(field));
    }
    table
}

fn relations_table(entity: &EntityMapping) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header(&["Relation", "Join", "Left", "Right"]));
    for relation in entity.relations() {
        table.add_row(vec![
            relation.name.clone(),
            relation.kind.to_string(),
            relation.left.to_string(),
            relation.right.to_string(),
        ]);
    }
    table
}
