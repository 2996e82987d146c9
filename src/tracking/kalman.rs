//! 2-D constant-velocity Kalman filter for the human position estimate.
//!
//! State: [px, py, vx, vy] (metres, m/s). Observation: [px, py], the
//! selected cluster centroid projected to the ground plane.
//!
//! The matrices are small and fixed-size, so the algebra is hand-rolled in
//! row-major arrays; H = [I2 | 0] lets every H product reduce to a block
//! extraction.

/// 4x4 matrix type (row-major)
pub type Mat4 = [[f64; 4]; 4];
/// 2x2 matrix type (row-major)
type Mat2 = [[f64; 2]; 2];
/// 4-vector
type Vec4 = [f64; 4];
/// 2-vector
pub type Vec2 = [f64; 2];

/// Kalman filter state for the tracked human.
///
/// Uses a constant-velocity motion model with discrete white-noise
/// acceleration process noise. The update is computed on scratch copies and
/// committed only when every resulting component is finite, so a degenerate
/// measurement can never leave the state half-written.
#[derive(Debug, Clone)]
pub struct KalmanState {
    /// State estimate [px, py, vx, vy].
    x: Vec4,
    /// State covariance (4x4, symmetric positive semi-definite).
    p: Mat4,
    /// Process noise variance sigma_a^2 in (m/s^2)^2.
    process_noise_var: f64,
    /// Measurement noise variance sigma_z^2 in m^2.
    measurement_noise_var: f64,
}

impl KalmanState {
    /// Seed the filter from a first position measurement.
    ///
    /// Velocity starts at zero; the covariance diagonal starts at
    /// `initial_covariance` on all four components.
    pub fn new(
        position: Vec2,
        initial_covariance: f64,
        process_noise_var: f64,
        measurement_noise_var: f64,
    ) -> Self {
        let mut p = [[0.0f64; 4]; 4];
        for i in 0..4 {
            p[i][i] = initial_covariance;
        }
        Self {
            x: [position[0], position[1], 0.0, 0.0],
            p,
            process_noise_var,
            measurement_noise_var,
        }
    }

    /// Propagate the state forward by `dt` seconds.
    ///
    /// Position moves by velocity * dt; covariance becomes F P F^T + Q with
    ///
    /// ```text
    ///        | dt^4/4 I2   dt^3/2 I2 |
    /// Q = s2 |                       |
    ///        | dt^3/2 I2   dt^2   I2 |
    /// ```
    pub fn predict(&mut self, dt: f64) {
        self.x[0] += dt * self.x[2];
        self.x[1] += dt * self.x[3];

        let mut f = mat4_identity();
        f[0][2] = dt;
        f[1][3] = dt;

        let fp = mat4_mul(&f, &self.p);
        let fpft = mat4_mul(&fp, &mat4_transpose(&f));
        self.p = mat4_add(&fpft, &process_noise(dt, self.process_noise_var));
    }

    /// Correct the state with a position measurement.
    ///
    /// Standard linear update with H = [I2 | 0]:
    ///
    /// ```text
    /// y = z - H x
    /// S = H P H^T + R
    /// K = P H^T S^-1
    /// x <- x + K y
    /// P <- (I - K H) P
    /// ```
    ///
    /// Returns `false` without touching the state when S is singular or the
    /// corrected state/covariance contains a non-finite value.
    #[must_use]
    pub fn update(&mut self, z: Vec2) -> bool {
        // Innovation against the predicted position.
        let y = [z[0] - self.x[0], z[1] - self.x[1]];

        // S = top-left 2x2 of P, plus R.
        let mut s: Mat2 = [
            [self.p[0][0], self.p[0][1]],
            [self.p[1][0], self.p[1][1]],
        ];
        s[0][0] += self.measurement_noise_var;
        s[1][1] += self.measurement_noise_var;

        let Some(s_inv) = mat2_inv(&s) else {
            return false;
        };

        // K = P H^T S^-1; P H^T is the first two columns of P (4x2).
        let mut k = [[0.0f64; 2]; 4];
        for i in 0..4 {
            for j in 0..2 {
                k[i][j] = self.p[i][0] * s_inv[0][j] + self.p[i][1] * s_inv[1][j];
            }
        }

        // Scratch state: x + K y.
        let mut x_new = self.x;
        for i in 0..4 {
            x_new[i] += k[i][0] * y[0] + k[i][1] * y[1];
        }

        // Scratch covariance: (I - K H) P, with (K H) zero outside the
        // first two columns.
        let mut kh = [[0.0f64; 4]; 4];
        for i in 0..4 {
            kh[i][0] = k[i][0];
            kh[i][1] = k[i][1];
        }
        let p_new = mat4_mul(&mat4_sub(&mat4_identity(), &kh), &self.p);

        if !vec4_finite(&x_new) || !mat4_finite(&p_new) {
            return false;
        }

        self.x = x_new;
        self.p = p_new;
        true
    }

    /// Current position estimate [px, py].
    pub fn position(&self) -> Vec2 {
        [self.x[0], self.x[1]]
    }

    /// Current velocity estimate [vx, vy].
    pub fn velocity(&self) -> Vec2 {
        [self.x[2], self.x[3]]
    }

    /// Full covariance matrix.
    pub fn covariance(&self) -> &Mat4 {
        &self.p
    }

    /// Trace of the covariance; the scalar uncertainty used for the lost
    /// condition and the quality indicator.
    pub fn covariance_trace(&self) -> f64 {
        self.p[0][0] + self.p[1][1] + self.p[2][2] + self.p[3][3]
    }
}

// ---------------------------------------------------------------------------
// Fixed-size matrix helpers
// ---------------------------------------------------------------------------

fn mat4_identity() -> Mat4 {
    let mut m = [[0.0f64; 4]; 4];
    for i in 0..4 {
        m[i][i] = 1.0;
    }
    m
}

fn mat4_mul(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut c = [[0.0f64; 4]; 4];
    for i in 0..4 {
        for j in 0..4 {
            for k in 0..4 {
                c[i][j] += a[i][k] * b[k][j];
            }
        }
    }
    c
}

fn mat4_add(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut c = [[0.0f64; 4]; 4];
    for i in 0..4 {
        for j in 0..4 {
            c[i][j] = a[i][j] + b[i][j];
        }
    }
    c
}

fn mat4_sub(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut c = [[0.0f64; 4]; 4];
    for i in 0..4 {
        for j in 0..4 {
            c[i][j] = a[i][j] - b[i][j];
        }
    }
    c
}

fn mat4_transpose(a: &Mat4) -> Mat4 {
    let mut t = [[0.0f64; 4]; 4];
    for i in 0..4 {
        for j in 0..4 {
            t[j][i] = a[i][j];
        }
    }
    t
}

/// Analytical 2x2 inverse; `None` if |det| < 1e-12.
fn mat2_inv(m: &Mat2) -> Option<Mat2> {
    let det = m[0][0] * m[1][1] - m[0][1] * m[1][0];
    if det.abs() < 1e-12 {
        return None;
    }
    let inv_det = 1.0 / det;
    Some([
        [m[1][1] * inv_det, -m[0][1] * inv_det],
        [-m[1][0] * inv_det, m[0][0] * inv_det],
    ])
}

fn vec4_finite(v: &Vec4) -> bool {
    v.iter().all(|c| c.is_finite())
}

fn mat4_finite(m: &Mat4) -> bool {
    m.iter().all(|row| row.iter().all(|c| c.is_finite()))
}

/// Discrete white-noise-acceleration process noise over a step of `dt`.
fn process_noise(dt: f64, s2: f64) -> Mat4 {
    let dt2 = dt * dt;
    let dt3 = dt2 * dt;
    let dt4 = dt3 * dt;

    let qpp = dt4 / 4.0 * s2;
    let qpv = dt3 / 2.0 * s2;
    let qvv = dt2 * s2;

    let mut q = [[0.0f64; 4]; 4];
    for i in 0..2 {
        q[i][i] = qpp;
        q[i + 2][i + 2] = qvv;
        q[i][i + 2] = qpv;
        q[i + 2][i] = qpv;
    }
    q
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_filter(position: Vec2) -> KalmanState {
        KalmanState::new(position, 1.0, 0.5, 0.01)
    }

    #[test]
    fn test_zero_velocity_prediction_stays_put() {
        let mut kf = default_filter([1.0, 2.0]);
        kf.predict(0.1);

        let pos = kf.position();
        assert!((pos[0] - 1.0).abs() < 1e-9);
        assert!((pos[1] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_prediction_inflates_covariance() {
        let mut kf = default_filter([0.0, 0.0]);
        let before = kf.covariance_trace();
        kf.predict(0.1);
        assert!(kf.covariance_trace() > before);
    }

    #[test]
    fn test_fixed_measurement_convergence() {
        let mut kf = default_filter([0.0, 0.0]);
        let target = [3.0, -1.5];

        for _ in 0..50 {
            kf.predict(0.1);
            assert!(kf.update(target));
        }

        let pos = kf.position();
        let vel = kf.velocity();
        assert!((pos[0] - 3.0).abs() < 0.05, "px: {}", pos[0]);
        assert!((pos[1] + 1.5).abs() < 0.05, "py: {}", pos[1]);
        assert!(vel[0].abs() < 0.1, "vx should settle near zero: {}", vel[0]);
        assert!(vel[1].abs() < 0.1, "vy should settle near zero: {}", vel[1]);
    }

    #[test]
    fn test_drifting_measurement_velocity_estimate() {
        let mut kf = default_filter([0.0, 0.0]);
        let dt = 0.1;
        let slope = [1.0, -0.5]; // m/s

        for step in 1..=100 {
            let t = step as f64 * dt;
            kf.predict(dt);
            assert!(kf.update([slope[0] * t, slope[1] * t]));
        }

        let vel = kf.velocity();
        assert!((vel[0] - 1.0).abs() < 0.1, "vx: {}", vel[0]);
        assert!((vel[1] + 0.5).abs() < 0.1, "vy: {}", vel[1]);
    }

    #[test]
    fn test_nonfinite_measurement_reverts() {
        let mut kf = default_filter([1.0, 1.0]);
        kf.predict(0.1);
        let before = kf.clone();

        assert!(!kf.update([f64::NAN, 0.0]));
        assert_eq!(kf.position(), before.position());
        assert_eq!(kf.covariance_trace(), before.covariance_trace());
    }

    #[test]
    fn test_covariance_stays_symmetric() {
        let mut kf = default_filter([0.0, 0.0]);
        for step in 0..20 {
            kf.predict(0.1);
            assert!(kf.update([step as f64 * 0.05, 0.0]));
        }

        let p = kf.covariance();
        for i in 0..4 {
            for j in 0..4 {
                assert!(
                    (p[i][j] - p[j][i]).abs() < 1e-9,
                    "P[{}][{}] != P[{}][{}]",
                    i,
                    j,
                    j,
                    i
                );
            }
        }
    }
}
