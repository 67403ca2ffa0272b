//! Formats command - list registered statement parsers

use anyhow::Result;

use super::get_context;
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let formats = ctx.parsers.formats();

    if json {
        let entries: Vec<_> = formats
            .iter()
            .map(|(tag, description)| serde_json::json!({ "format": tag, "description": description }))
            .collect();
        return output::json(&entries);
    }

    let mut table = output::create_table();
    table.set_header(vec!["Format", "Description"]);
    for (tag, description) in &formats {
        table.add_row(vec![tag.as_str(), description.as_str()]);
    }
    println!("{}", table);
    Ok(())
}
