//! Entry templates: named snippets of `add` text.

use std::io::Write;

use anyhow::{Result, bail};
use chronos_core::{is_present, sanitize_description, sanitize_name};
use chronos_db::Database;

/// Saves `text` under `name`, shows the named template, or lists all of them.
pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    name: Option<&str>,
    text: &[String],
) -> Result<()> {
    let Some(name) = name else {
        let templates = db.list_templates()?;
        if templates.is_empty() {
            writeln!(writer, "No templates.")?;
        }
        for (name, text) in templates {
            writeln!(writer, "{name}: {text}")?;
        }
        return Ok(());
    };

    let name = sanitize_name(name);
    if !is_present(&name) {
        bail!("template name has no usable characters");
    }

    if text.is_empty() {
        match db.get_template(&name)? {
            Some(saved) => writeln!(writer, "{saved}")?,
            None => bail!("template '{name}' not found"),
        }
        return Ok(());
    }

    let body = sanitize_description(&text.join(" "));
    db.save_template(&name, &body)?;
    writeln!(writer, "Template '{name}' saved")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(text: &str) -> Vec<String> {
        text.split(' ').map(String::from).collect()
    }

    #[test]
    fn test_save_show_and_list() {
        let db = Database::open_in_memory().unwrap();
        let mut output = Vec::new();
        run(&mut output, &db, Some("standup"), &words("15m Apollo Meeting daily standup")).unwrap();
        run(&mut output, &db, Some("standup"), &[]).unwrap();
        run(&mut output, &db, None, &[]).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Template 'standup' saved\n\
             15m Apollo Meeting daily standup\n\
             standup: 15m Apollo Meeting daily standup\n"
        );
    }

    #[test]
    fn test_missing_template_fails() {
        let db = Database::open_in_memory().unwrap();
        assert!(run(&mut Vec::new(), &db, Some("nope"), &[]).is_err());

        let mut output = Vec::new();
        run(&mut output, &db, None, &[]).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "No templates.\n");
    }
}
