use super::{GridPoint, OccupancyGrid, ScreenPoint};
use skyward_kinematics::Pose;
use tracing::debug;

/// Cells written by a single obstacle insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct ObstacleInsertion {
    /// Screen point hit by the measurement, truncated to whole pixels.
    pub struck: ScreenPoint,
    /// Grid cell containing the struck point. May lie outside the grid.
    pub center: GridPoint,
    /// In-bounds cells that were marked, ring by ring outwards from `center`.
    pub cells: Vec<GridPoint>,
}

/// Writes range measurements into an [`OccupancyGrid`] as obstacles.
pub struct ObstacleMapper;

impl ObstacleMapper {
    /// Screen point hit by a measurement taken from `pose`.
    ///
    /// # Arguments
    /// * `grid` - Supplies the screen/area ratio used to scale `distance`
    /// * `pose` - Current drone pose in the screen frame
    /// * `distance` - Measured distance in area units (cm)
    /// * `bearing` - Direction of the measurement relative to `pose.heading` (rad)
    pub fn struck_point(grid: &OccupancyGrid, pose: &Pose, distance: f64, bearing: f64) -> ScreenPoint {
        let reach = distance * grid.frame().screen_per_area();
        let direction = pose.heading + bearing;
        ScreenPoint::new(
            (pose.x + reach * direction.cos()).trunc(),
            (pose.y + reach * direction.sin()).trunc(),
        )
    }

    /// Marks the obstacle hit by a measurement, widened by an uncertainty radius.
    ///
    /// The struck cell and the Manhattan rings `1..radius` around it become
    /// obstacles. Rings are added one distance at a time, so the result is a
    /// diamond rather than a filled disk. Cells off the grid are skipped.
    ///
    /// The radius is clipped to the Manhattan distance between the struck cell
    /// and the drone's cell, so the drone is never boxed in by its own
    /// measurement. A measurement that lands in the drone's cell marks nothing.
    ///
    /// # Returns
    /// * `ObstacleInsertion` - The struck point and every cell that was marked
    pub fn insert_obstacle(
        grid: &mut OccupancyGrid,
        pose: &Pose,
        distance: f64,
        bearing: f64,
        radius: u32,
    ) -> ObstacleInsertion {
        let struck = Self::struck_point(grid, pose, distance, bearing);
        let center = grid.screen_to_grid(struck);
        let pose_cell = grid.screen_to_grid(ScreenPoint::new(pose.x, pose.y));

        let radius = radius.min(center.manhattan(&pose_cell));

        let targets: Vec<GridPoint> = match radius {
            0 => Vec::new(),
            _ => std::iter::once(center)
                .chain((1..radius).flat_map(|d| grid.manhattan_ring(center, d)))
                .collect(),
        };

        let mut cells = Vec::new();
        for cell in targets {
            if grid.mark_obstacle(cell) {
                cells.push(cell);
            }
        }

        debug!(?center, marked = cells.len(), distance, bearing, "Inserted obstacle");
        ObstacleInsertion { struck, center, cells }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{CellState, MapFrame};
    use std::f64::consts::FRAC_PI_2;

    fn create_test_grid() -> OccupancyGrid {
        // 10px cells on the screen, 20cm cells in the area
        OccupancyGrid::new(MapFrame::new(20, 20, (200.0, 200.0), (400.0, 400.0)).unwrap())
    }

    #[test]
    fn test_struck_point_scaling() {
        let grid = create_test_grid();
        let pose = Pose::new(100.0, 100.0, 0.0);

        // 60cm is 30px at this scale
        let p = ObstacleMapper::struck_point(&grid, &pose, 60.0, 0.0);
        assert_eq!(p, ScreenPoint::new(130.0, 100.0));

        // Bearing is relative to heading; heading 0 + bearing PI/2 points down
        let p = ObstacleMapper::struck_point(&grid, &pose, 60.0, FRAC_PI_2);
        assert_eq!(p, ScreenPoint::new(100.0, 130.0));

        // Truncation, not rounding
        let p = ObstacleMapper::struck_point(&grid, &pose, 21.9, 0.0);
        assert_eq!(p, ScreenPoint::new(110.0, 100.0));
    }

    #[test]
    fn test_insert_marks_center_and_rings() {
        let mut grid = create_test_grid();
        let pose = Pose::new(100.0, 100.0, 0.0);

        let result = ObstacleMapper::insert_obstacle(&mut grid, &pose, 60.0, 0.0, 3);
        assert_eq!(result.center, GridPoint::new(13, 10));

        // Center + ring 1 (4 cells) + ring 2 (8 cells)
        assert_eq!(result.cells.len(), 13);
        assert_eq!(grid.obstacles().len(), 13);
        for cell in &result.cells {
            assert!(cell.manhattan(&result.center) < 3);
            assert_eq!(grid.cell(*cell), CellState::Obstacle);
        }
        assert!(!grid.is_obstacle(GridPoint::new(16, 10)));
        assert!(!grid.is_obstacle(GridPoint::new(15, 12)));
        assert_eq!(grid.count(CellState::Obstacle), 13);
    }

    #[test]
    fn test_insert_radius_one_marks_only_center() {
        let mut grid = create_test_grid();
        let pose = Pose::new(50.0, 50.0, 0.0);
        let result = ObstacleMapper::insert_obstacle(&mut grid, &pose, 40.0, 0.0, 1);
        assert_eq!(result.cells, vec![GridPoint::new(7, 5)]);
    }

    #[test]
    fn test_insert_radius_clipped_near_drone() {
        let mut grid = create_test_grid();
        let pose = Pose::new(51.0, 55.0, 0.0);

        // 40cm is 20px: two cells ahead, so only the center and ring 1 fit
        let result = ObstacleMapper::insert_obstacle(&mut grid, &pose, 40.0, 0.0, 4);
        assert_eq!(result.center, GridPoint::new(7, 5));
        assert_eq!(result.cells.len(), 5);
        assert!(grid.is_obstacle(GridPoint::new(6, 5)));
        assert!(!grid.is_obstacle(GridPoint::new(5, 5)));
        assert!(!grid.is_obstacle(GridPoint::new(4, 5)));
        assert!(!grid.is_obstacle(GridPoint::new(5, 4)));
    }

    #[test]
    fn test_insert_in_drone_cell_marks_nothing() {
        let mut grid = create_test_grid();
        let pose = Pose::new(51.0, 55.0, 0.0);

        // 10cm is 5px: still inside the drone's cell
        let result = ObstacleMapper::insert_obstacle(&mut grid, &pose, 10.0, 0.0, 3);
        assert_eq!(result.center, GridPoint::new(5, 5));
        assert!(result.cells.is_empty());
        assert!(grid.obstacles().is_empty());
    }

    #[test]
    fn test_insert_off_grid_is_clipped() {
        let mut grid = create_test_grid();
        let pose = Pose::new(185.0, 100.0, 0.0);

        // Struck point lands one cell right of the grid edge
        let result = ObstacleMapper::insert_obstacle(&mut grid, &pose, 40.0, 0.0, 2);
        assert_eq!(result.center, GridPoint::new(20, 10));
        assert_eq!(result.cells, vec![GridPoint::new(19, 10)]);
        assert_eq!(grid.obstacles(), &[GridPoint::new(19, 10)]);
    }
}
