//! Project and client commands.

use std::io::Write;

use anyhow::{Context, Result, bail};
use chronos_core::{is_present, sanitize_name};
use chronos_db::{Database, NewProject};

pub fn add_project<W: Write>(
    writer: &mut W,
    db: &Database,
    name: &str,
    client: Option<&str>,
    rate: Option<f64>,
) -> Result<()> {
    if !is_present(&sanitize_name(name)) {
        bail!("project name '{name}' has no usable characters");
    }
    let rate = rate.unwrap_or(0.0);
    if !rate.is_finite() || rate < 0.0 {
        bail!("rate must be a non-negative number, got {rate}");
    }
    if db.find_project_by_name(name)?.is_some() {
        bail!("project '{name}' already exists");
    }

    let client_id = match client {
        Some(client_name) => Some(
            db.find_client_by_name(client_name)?
                .with_context(|| format!("client '{client_name}' not found"))?
                .id,
        ),
        None => None,
    };
    let project = db.create_project(&NewProject {
        name: name.to_string(),
        client_id,
        rate,
    })?;
    writeln!(writer, "Project {} '{}' added", project.id, project.name)?;
    Ok(())
}

pub fn list_projects<W: Write>(writer: &mut W, db: &Database) -> Result<()> {
    let projects = db.list_projects(None)?;
    if projects.is_empty() {
        writeln!(writer, "No projects.")?;
        return Ok(());
    }
    let clients = db.list_clients()?;
    for project in projects {
        let client = project
            .client_id
            .and_then(|id| clients.iter().find(|c| c.id == id))
            .map_or("-", |c| c.name.as_str());
        writeln!(
            writer,
            "{:<4}  {}  client: {client}  rate: {:.2}/h",
            project.id, project.name, project.rate
        )?;
    }
    Ok(())
}

pub fn add_client<W: Write>(
    writer: &mut W,
    db: &Database,
    name: &str,
    contact: Option<&str>,
) -> Result<()> {
    if !is_present(&sanitize_name(name)) {
        bail!("client name '{name}' has no usable characters");
    }
    let client = db.create_client(name, contact.unwrap_or_default())?;
    writeln!(writer, "Client {} '{}' added", client.id, client.name)?;
    Ok(())
}

pub fn list_clients<W: Write>(writer: &mut W, db: &Database) -> Result<()> {
    let clients = db.list_clients()?;
    if clients.is_empty() {
        writeln!(writer, "No clients.")?;
        return Ok(());
    }
    for client in clients {
        if client.contact_info.is_empty() {
            writeln!(writer, "{:<4}  {}", client.id, client.name)?;
        } else {
            writeln!(
                writer,
                "{:<4}  {}  <{}>",
                client.id, client.name, client.contact_info
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    #[test]
    fn test_projects_and_clients_listing() {
        let db = Database::open_in_memory().unwrap();
        let mut output = Vec::new();
        add_client(&mut output, &db, "Acme", Some("ops@acme.test")).unwrap();
        add_client(&mut output, &db, "Globex", None).unwrap();
        add_project(&mut output, &db, "Apollo", Some("acme"), Some(95.0)).unwrap();
        add_project(&mut output, &db, "Zeus", None, None).unwrap();
        list_clients(&mut output, &db).unwrap();
        list_projects(&mut output, &db).unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Client 1 'Acme' added
        Client 2 'Globex' added
        Project 1 'Apollo' added
        Project 2 'Zeus' added
        1     Acme  <ops@acme.test>
        2     Globex
        1     Apollo  client: Acme  rate: 95.00/h
        2     Zeus  client: -  rate: 0.00/h
        ");
    }

    #[test]
    fn test_add_project_validates_input() {
        let db = Database::open_in_memory().unwrap();
        let mut output = Vec::new();
        assert!(add_project(&mut output, &db, "Apollo", Some("Nobody"), None).is_err());
        assert!(add_project(&mut output, &db, "Apollo", None, Some(-5.0)).is_err());
        assert!(add_project(&mut output, &db, "???", None, None).is_err());

        add_project(&mut output, &db, "Apollo", None, None).unwrap();
        assert!(add_project(&mut output, &db, "apollo", None, None).is_err());
    }

    #[test]
    fn test_empty_listings() {
        let db = Database::open_in_memory().unwrap();
        let mut output = Vec::new();
        list_projects(&mut output, &db).unwrap();
        list_clients(&mut output, &db).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "No projects.\nNo clients.\n");
    }
}
