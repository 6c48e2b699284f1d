//! Full traversals built on the cursor protocol.

use crate::cursor::CURSOR_START;
use crate::error::Result;
use crate::traits::{Container, Item, Location};

/// Visit every item of `container` whose name starts with `prefix`, fetching
/// `page_size` entries per listing call. The first error, from listing or
/// from `visit`, stops the walk and is returned.
pub fn walk_items<F>(
    container: &dyn Container,
    prefix: &str,
    page_size: usize,
    mut visit: F,
) -> Result<()>
where
    F: FnMut(&dyn Item) -> Result<()>,
{
    let mut cursor = CURSOR_START.to_string();
    loop {
        let page = container.items(prefix, &cursor, page_size)?;
        for item in &page.items {
            visit(item.as_ref())?;
        }
        if page.is_last() {
            return Ok(());
        }
        cursor = page.cursor;
    }
}

/// Visit every container of `location` whose name starts with `prefix`.
pub fn walk_containers<F>(
    location: &dyn Location,
    prefix: &str,
    page_size: usize,
    mut visit: F,
) -> Result<()>
where
    F: FnMut(&dyn Container) -> Result<()>,
{
    let mut cursor = CURSOR_START.to_string();
    loop {
        let page = location.containers(prefix, &cursor, page_size)?;
        for container in &page.items {
            visit(container.as_ref())?;
        }
        if page.is_last() {
            return Ok(());
        }
        cursor = page.cursor;
    }
}
