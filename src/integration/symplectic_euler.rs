use crate::bodies::PbdBody;
use crate::integration::{IntegrationParams, Integrator};
use crate::math::{integrate_rotation, inverse_inertia_world, Matrix3, Real, Vector3};

/// Bodies with more particles than this are integrated in parallel
#[cfg(feature = "parallel")]
const PARALLEL_PARTICLE_COUNT: usize = 50;

/// Symplectic Euler integrator (semi-implicit Euler)
///
/// Velocities are advanced by the external accelerations first and the prediction uses the
/// new velocity. After the solve the velocity is recovered from the displacement.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymplecticEulerIntegrator;

impl SymplecticEulerIntegrator {
    /// Creates a new Symplectic Euler integrator
    pub fn new() -> Self {
        Self
    }
}

fn for_each_particle<T, F>(items: &mut [T], f: F)
where
    T: Send,
    F: Fn(usize, &mut T) + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        if items.len() > PARALLEL_PARTICLE_COUNT {
            use rayon::prelude::*;
            items.par_iter_mut().enumerate().for_each(|(i, item)| f(i, item));
            return;
        }
    }
    items.iter_mut().enumerate().for_each(|(i, item)| f(i, item));
}

fn clamp_components(v: Vector3, threshold: Real) -> Vector3 {
    v.map(|c| c.max(-threshold).min(threshold))
}

impl Integrator for SymplecticEulerIntegrator {
    fn integrate_position(&self, body: &mut PbdBody, params: &IntegrationParams) {
        let dt = params.dt;
        let force = *body.external_force();
        let torque = *body.external_torque();

        body.prev_positions.copy_from_slice(&body.positions);
        let inv_masses = &body.inv_masses;
        for_each_particle(&mut body.velocities, |i, v| {
            if inv_masses[i] > 0.0 {
                *v += (params.gravity + force * inv_masses[i]) * dt;
            }
        });
        let velocities = &body.velocities;
        let linear_scale = (1.0 - params.linear_damping) * dt;
        for_each_particle(&mut body.positions, |i, x| {
            if inv_masses[i] > 0.0 {
                *x += velocities[i] * linear_scale;
            }
        });

        if !body.body_type().is_oriented() {
            return;
        }

        body.prev_orientations.copy_from_slice(&body.orientations);
        let orientations = &body.orientations;
        let inertias = &body.inertias;
        let inv_inertias = &body.inv_inertias;
        let rotates = |i: usize| inv_inertias[i] != Matrix3::zeros();

        // Gyroscopic term in world space
        for_each_particle(&mut body.angular_velocities, |i, w| {
            if rotates(i) {
                let r = orientations[i].to_rotation_matrix();
                let inertia = r.matrix() * inertias[i] * r.matrix().transpose();
                let inv_inertia = inverse_inertia_world(&orientations[i], &inv_inertias[i]);
                *w += inv_inertia * (torque - w.cross(&(inertia * *w))) * dt;
            }
        });
        let angular_velocities = &body.angular_velocities;
        let angular_scale = (1.0 - params.angular_damping) * dt;
        for_each_particle(&mut body.orientations, |i, q| {
            if rotates(i) {
                *q = integrate_rotation(q, &(angular_velocities[i] * angular_scale));
            }
        });
    }

    fn update_velocity(&self, body: &mut PbdBody, params: &IntegrationParams) {
        if params.dt <= 0.0 {
            return;
        }
        let inv_dt = 1.0 / params.dt;
        let threshold = params.velocity_threshold;

        let positions = &body.positions;
        let prev_positions = &body.prev_positions;
        let inv_masses = &body.inv_masses;
        for_each_particle(&mut body.velocities, |i, v| {
            if inv_masses[i] > 0.0 {
                *v = clamp_components((positions[i] - prev_positions[i]) * inv_dt, threshold);
            }
        });

        if !body.body_type().is_oriented() {
            return;
        }

        let orientations = &body.orientations;
        let prev_orientations = &body.prev_orientations;
        let inv_inertias = &body.inv_inertias;
        for_each_particle(&mut body.angular_velocities, |i, w| {
            if inv_inertias[i] != Matrix3::zeros() {
                let dq = (orientations[i] * prev_orientations[i].inverse()).into_inner();
                let angular = dq.imag() * (2.0 * inv_dt);
                let angular = if dq.w >= 0.0 { angular } else { -angular };
                *w = clamp_components(angular, threshold);
            }
        });
    }

    fn name(&self) -> &str {
        "SymplecticEuler"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bodies::BodyGeometry;
    use crate::math::Quaternion;
    use approx::assert_relative_eq;

    fn params(dt: Real) -> IntegrationParams {
        IntegrationParams {
            dt,
            gravity: Vector3::new(0.0, -10.0, 0.0),
            linear_damping: 0.0,
            angular_damping: 0.0,
            velocity_threshold: 1.0e5,
        }
    }

    #[test]
    fn free_fall_round_trips_velocity() {
        let mut body = PbdBody::new();
        body.set_geometry(BodyGeometry::points(vec![Vector3::zeros()]));
        body.initialize().unwrap();

        let integrator = SymplecticEulerIntegrator::new();
        integrator.integrate_position(&mut body, &params(0.1));
        assert_relative_eq!(body.positions[0].y, -0.1, epsilon = 1e-12);

        integrator.update_velocity(&mut body, &params(0.1));
        assert_relative_eq!(body.velocities[0].y, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn spinning_rigid_body_recovers_angular_velocity() {
        let mut body = PbdBody::new();
        body.set_rigid(Vector3::zeros(), 1.0, Quaternion::identity(), Matrix3::identity())
            .unwrap();
        body.set_rigid_velocity(Vector3::zeros(), Vector3::new(0.0, 0.0, 1.0)).unwrap();
        body.initialize().unwrap();

        let mut p = params(0.01);
        p.gravity = Vector3::zeros();
        let integrator = SymplecticEulerIntegrator::new();
        integrator.integrate_position(&mut body, &p);
        integrator.update_velocity(&mut body, &p);

        assert_relative_eq!(body.orientations[0].norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(body.angular_velocities[0].z, 1.0, epsilon = 1e-4);
    }
}
