use crate::error::{NftError, Result};
use crate::model::{PortId, Table};

/// Reject access to an owner-flagged table from any other connection.
pub fn check_access(table: &Table, port: PortId) -> Result<()> {
    match table.owner {
        Some(owner) if table.is_owned() && owner != port => Err(NftError::denied(format!(
            "table {} is owned by port {}",
            table.name, owner
        ))),
        _ => Ok(()),
    }
}

/// Whether `port` may see `table` in listings and flushes.
pub fn is_visible(table: &Table, port: PortId) -> bool {
    check_access(table, port).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::Family;
    use crate::model::TableFlags;

    fn owned_table(owner: u32) -> Table {
        let mut table = Table::new(
            1,
            Family::Inet,
            "owned",
            TableFlags::from_bits(TableFlags::OWNER).unwrap(),
        );
        table.owner = Some(PortId(owner));
        table
    }

    #[test]
    fn owner_passes_gate() {
        assert!(check_access(&owned_table(7), PortId(7)).is_ok());
    }

    #[test]
    fn other_port_is_denied() {
        let err = check_access(&owned_table(7), PortId(8)).unwrap_err();
        assert!(matches!(err, NftError::PermissionDenied(_)));
        assert!(!is_visible(&owned_table(7), PortId(8)));
    }

    #[test]
    fn unowned_tables_are_public() {
        let table = Table::new(1, Family::Ipv4, "public", TableFlags::default());
        assert!(check_access(&table, PortId(99)).is_ok());
    }
}
