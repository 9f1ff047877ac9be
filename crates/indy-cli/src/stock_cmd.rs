//! Handler for `indy materials rebalance`.

use std::path::Path;

use anyhow::{Context, Result};
use sqlx::PgPool;

use indy_core::stock::{
    RebalanceStrategy, StockSnapshot, WarehouseScope, rebalance_materials_from_stock,
};

use crate::{MaterialCommands, print_json};

pub async fn run_material_command(
    command: MaterialCommands,
    pool: &PgPool,
    user: &str,
    json: bool,
) -> Result<()> {
    match command {
        MaterialCommands::Rebalance {
            project_id,
            stock_file,
            scope,
            strategy,
        } => {
            let scope: WarehouseScope = scope.parse()?;
            let strategy: RebalanceStrategy = strategy.parse()?;
            let snapshot = load_stock(Path::new(&stock_file))?;

            let rows = rebalance_materials_from_stock(
                pool, user, project_id, &snapshot, scope, strategy,
            )
            .await?;
            if json {
                return print_json(&rows);
            }

            println!("Rebalanced {} material row(s) ({scope}, {strategy}).", rows.len());
            for r in &rows {
                let task = r
                    .task_id
                    .map(|id| format!("#{id}"))
                    .unwrap_or_else(|| "project".to_owned());
                println!(
                    "  {:<8} type {:>10}  required {:>8}  stock {:>8}  buy {:>8}  build {:>8}  {}",
                    task,
                    r.type_id,
                    r.required_qty,
                    r.available_qty,
                    r.buy_qty,
                    r.build_qty,
                    r.source
                );
            }
            Ok(())
        }
    }
}

/// Read a stock snapshot:
///
/// ```json
/// { "totals": { "34": 1000 }, "by_location": { "34": { "60003760": 800 } } }
/// ```
pub fn load_stock(path: &Path) -> Result<StockSnapshot> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read stock file: {}", path.display()))?;
    let snapshot: StockSnapshot = serde_json::from_str(&content)
        .with_context(|| format!("invalid stock file: {}", path.display()))?;
    Ok(snapshot)
}
