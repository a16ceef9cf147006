use skyward_kinematics::Pose;
use skyward_navigation::map::{GridPoint, MapFrame, ObstacleMapper, OccupancyGrid, ScreenPoint};
use skyward_navigation::{PathSmoother, PlannerConfig, RrtPlanner, SmootherConfig};
use tracing_subscriber::EnvFilter;

fn create_grid() -> OccupancyGrid {
    let frame = match MapFrame::new(30, 20, (300.0, 200.0), (3000.0, 2000.0)) {
        Ok(frame) => frame,
        Err(e) => panic!("Invalid map frame: {}", e),
    };
    let mut grid = OccupancyGrid::new(frame);

    // A wall down the middle with a gap near the bottom
    for y in 0..15 {
        grid.mark_obstacle(GridPoint::new(15, y));
    }

    // Something seen 4m ahead of a drone parked at the left edge, facing east
    let drone = Pose::new(15.0, 175.0, 0.0);
    let insertion = ObstacleMapper::insert_obstacle(&mut grid, &drone, 400.0, 0.0, 2);
    println!("Mapped obstacle at {:?} ({} cells)", insertion.center, insertion.cells.len());

    grid
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let grid = create_grid();
    let start = ScreenPoint::new(15.0, 15.0);
    let goal = ScreenPoint::new(285.0, 15.0);

    let mut planner = match RrtPlanner::new(grid.clone(), start, goal, PlannerConfig::default()) {
        Ok(planner) => planner,
        Err(e) => {
            eprintln!("Failed to create planner: {}", e);
            return;
        }
    };

    let result = match planner.plan(&mut rand::rng()) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("No path found: {}", e);
            return;
        }
    };
    println!("{}", result);

    let smoother = PathSmoother::new(SmootherConfig::default()).unwrap_or_default();
    let trajectory = smoother.smooth(&grid, &result.path, grid.screen_to_grid(start));

    let mut marked = grid.clone();
    for &cell in trajectory.iter() {
        marked.mark_traversed(cell);
    }
    println!("{}", marked);
    println!("Trajectory ({} nodes): {}", trajectory.len(), trajectory);
}
