#![no_main]

use glam::{Quat, Vec3};
use libfuzzer_sys::fuzz_target;
use rhizome_resin_ik::{HingeConstraint, RotationConstraint, SwingTwistConstraint};

fuzz_target!(|data: ([f32; 4], [f32; 3])| {
    let ([x, y, z, w], [a, b, c]) = data;
    let rotation = Quat::from_xyzw(x, y, z, w);
    if !rotation.is_finite() || rotation.length_squared() < 1e-6 {
        return;
    }
    let rotation = rotation.normalize();
    if !rotation.is_normalized() {
        return;
    }

    let mut constraints = [
        RotationConstraint::from(
            SwingTwistConstraint::new()
                .with_twist_limits(-0.5, 0.5)
                .with_elliptical_swing(0.4, 1.3),
        ),
        RotationConstraint::from(HingeConstraint::new(Vec3::Z).with_angle_limits(0.05, 2.8)),
    ];

    // apply should always return a finite unit quaternion
    for constraint in &mut constraints {
        let mut r = rotation;
        constraint.apply(&mut r);
        assert!(r.is_finite());
        assert!((r.length() - 1.0).abs() < 1e-3);

        let adjust = Quat::from_xyzw(a, b, c, 1.0).normalize();
        if adjust.is_finite() {
            constraint.dynamically_adjust_limits(adjust);
        }
    }
});
