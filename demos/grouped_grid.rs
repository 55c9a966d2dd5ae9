/// Grouped Grid Example
///
/// This example demonstrates:
/// - Filtering and sorting rows through grid actions
/// - Grouping with expandable headers and column aggregates
/// - Windowing a display list whose headers are taller than its rows
/// - Running the same pipeline on the offloaded worker

use livegrid::{
    Aggregator, Column, ColumnKind, CoordinatorConfig, ExecutionCoordinator, FilterOperator, FilterSpec, Grid,
    GridAction, GridConfig, GridResult, Row, SortSpec,
};

fn print_visible(grid: &Grid, container_height: f64) {
    for visible in grid.visible_rows(container_height) {
        match visible.row.as_group() {
            Some(header) => println!(
                "   {:>6.0}px  [{}] {} ({} rows, avg salary {:.0})",
                visible.offset,
                if header.is_expanded { "-" } else { "+" },
                header.key(),
                header.count,
                header.aggregates.get("salary").copied().unwrap_or(0.0)
            ),
            None => println!(
                "   {:>6.0}px      {} {}",
                visible.offset,
                visible.row.id(),
                visible.row.row().get("name").map(|v| v.to_string()).unwrap_or_default()
            ),
        }
    }
}

#[tokio::main]
async fn main() -> GridResult<()> {
    println!("=== LiveGrid Grouped Grid Example ===\n");

    // 1. Create a grid of employees
    println!("1. Creating grid...");
    let depts = ["Engineering", "Sales", "Support"];
    let rows: Vec<Row> = (0..30)
        .map(|i| {
            Row::new(format!("e{}", i))
                .with("name", format!("Employee {}", i))
                .with("dept", depts[i % depts.len()])
                .with("salary", (40_000 + i * 2_500) as i64)
        })
        .collect();
    let columns = vec![
        Column::new("name", "Name").with_kind(ColumnKind::String),
        Column::new("dept", "Department").with_kind(ColumnKind::String),
        Column::new("salary", "Salary")
            .with_kind(ColumnKind::Number)
            .with_aggregator(Aggregator::Avg),
    ];

    let mut grid = Grid::new(rows.clone(), columns.clone());
    println!("   {} rows, total height {}px\n", grid.display().len(), grid.total_height());

    // 2. Filter and sort
    println!("2. Salary >= 60000, highest first...");
    grid.dispatch(GridAction::AddFilter {
        filter: FilterSpec::new("salary", FilterOperator::Gte, 60_000),
    })?;
    grid.dispatch(GridAction::SetSort { sort: Some(SortSpec::descending("salary")) })?;
    println!("   {} rows match\n", grid.display().len());

    // 3. Group by department and expand one group
    println!("3. Grouping by department, expanding Sales...");
    grid.dispatch(GridAction::AddGroup { field: "dept".to_string() })?;
    grid.dispatch(GridAction::ToggleGroupExpansion { key: "dept_Sales".to_string() })?;
    print_visible(&grid, 400.0);
    println!();

    // 4. Scroll: headers are 44px, rows 40px
    println!("4. Scrolling to 120px with a 160px viewport...");
    grid.dispatch(GridAction::SetScrollPosition { top: 120.0, left: 0.0 })?;
    let window = grid.window(160.0);
    println!(
        "   entries {}..{} of {} ({}px total)",
        window.start_index,
        window.end_index,
        grid.display().len(),
        window.total_height
    );
    print_visible(&grid, 160.0);
    println!();

    // 5. Same actions on the offloaded worker
    println!("5. Running the pipeline on the worker...");
    let coordinator = ExecutionCoordinator::new(CoordinatorConfig::default());
    let mut offloaded = Grid::with_coordinator(rows, columns, GridConfig::default(), coordinator);
    println!("   worker available: {}", offloaded.is_worker_available());

    offloaded.dispatch(GridAction::AddGroup { field: "dept".to_string() })?;
    offloaded.settle().await;
    println!("   {} group headers", offloaded.display().len());
    println!("   status: {:?}", offloaded.status());

    println!("\n=== Example Complete ===");
    Ok(())
}
