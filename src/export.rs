//! CSV output. The file is rewritten as a whole at the end of a run.

use crate::types::AcceptedContact;
use crate::Result;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

pub const HEADER: [&str; 4] = ["email", "author name", "source url", "discovered at"];

/// Writes `contacts` to any writer, header first, rows in the given order.
pub fn write_contacts<W: Write>(writer: W, contacts: &[AcceptedContact]) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new().from_writer(writer);
    csv_writer.write_record(HEADER)?;

    for contact in contacts {
        let discovered_at = contact.discovered_at.to_rfc3339();
        csv_writer.write_record([
            contact.email.as_str(),
            contact.author.as_deref().unwrap_or_default(),
            contact.source_url.as_str(),
            discovered_at.as_str(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Replaces the file at `path` with the given contacts.
pub fn save_contacts(path: &Path, contacts: &[AcceptedContact]) -> Result<()> {
    let file = File::create(path)?;
    write_contacts(file, contacts)?;
    info!(path = %path.display(), rows = contacts.len(), "Contacts saved");
    Ok(())
}
