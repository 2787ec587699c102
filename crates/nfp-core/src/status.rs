use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceStatus {
    pub generation: u32,
    pub tables: Vec<TableStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableStatus {
    pub name: String,
    pub family: String,
    pub handle: u64,
    pub flags: u32,
    pub owner: Option<u32>,
    pub chains: Vec<ChainStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStatus {
    pub name: String,
    pub handle: u64,
    pub hook: Option<String>,
    pub policy: Option<String>,
    pub use_count: u32,
    pub rules: usize,
}

impl TableStatus {
    pub fn rule_count(&self) -> usize {
        self.chains.iter().map(|c| c.rules).sum()
    }
}

impl NamespaceStatus {
    pub fn new() -> Self {
        Self {
            generation: 0,
            tables: vec![],
        }
    }

    pub fn display(&self) {
        println!("📊 Namespace Status (generation {})\n", self.generation);

        println!("🔥 Tables ({}):", self.tables.len());
        if self.tables.is_empty() {
            println!("  (none)");
            return;
        }

        for table in &self.tables {
            let owner = table
                .owner
                .map(|o| format!(" [owner: {}]", o))
                .unwrap_or_default();
            println!(
                "  • {} ({}) #{} - {} chains, {} rules{}",
                table.name,
                table.family,
                table.handle,
                table.chains.len(),
                table.rule_count(),
                owner
            );
            for chain in &table.chains {
                let hook = match (&chain.hook, &chain.policy) {
                    (Some(hook), Some(policy)) => format!(" hook {} policy {}", hook, policy),
                    _ => String::new(),
                };
                println!(
                    "    - {} #{}{} ({} rules, use {})",
                    chain.name, chain.handle, hook, chain.rules, chain.use_count
                );
            }
        }
    }
}

impl Default for NamespaceStatus {
    fn default() -> Self {
        Self::new()
    }
}
