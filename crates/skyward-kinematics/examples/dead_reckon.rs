use skyward_kinematics::*;

fn main() {
    let from = (50.0, 50.0);
    let to = (150.0, 120.0);
    let travel_time = 2.0; // seconds
    let dt = 0.25; // Time step in seconds

    let leg = distance(from, to);
    let heading = bearing(from, to);

    let speed = match travel_speed(leg, travel_time) {
        Ok(speed) => speed,
        Err(e) => {
            eprintln!("Failed to derive speed: {}", e);
            return;
        }
    };

    let rotation = Rotation::from_delta(heading);
    println!("Leg {:?} -> {:?}: {:.1} units, turn {}, {:.1} units/s", from, to, leg, rotation, speed);

    let mut pose = Pose::new(from.0, from.1, 0.0).with_heading(heading);
    let steps = (travel_time / dt) as usize;
    for i in 0..steps {
        match pose.advance(speed, dt) {
            Ok(next) => {
                pose = next;
                println!("Step {:>2}: Pose: {}", i + 1, pose);
            }
            Err(e) => {
                eprintln!("Error during step {}: {:?}", i + 1, e);
                break;
            }
        }
    }

    println!("Final Pose: {:?} (target {:?})", pose, to);
}
