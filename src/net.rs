// src/net.rs
//
// Dense policy/value network with explicit forward and backward passes.
//
// Two shared tanh layers feed five categorical logit heads (one per tuned
// parameter) and a scalar value head. No autograd: the backward pass takes
// upstream gradients w.r.t. the head outputs and accumulates parameter
// gradients layer by layer, so the PPO update stays a few screens of
// arithmetic instead of a framework dependency.
//
// Weight layout is row-major: w[i * out_dim + j] connects input i to
// output j.

use rand::Rng;
use rand_distr::StandardNormal;

/// One fully-connected layer.
#[derive(Debug, Clone)]
pub struct Dense {
    pub w: Vec<f64>,
    pub b: Vec<f64>,
    pub in_dim: usize,
    pub out_dim: usize,
}

impl Dense {
    fn new(in_dim: usize, out_dim: usize, rng: &mut impl Rng) -> Self {
        let scale = (2.0 / (in_dim + out_dim) as f64).sqrt();
        let w = (0..in_dim * out_dim)
            .map(|_| {
                let z: f64 = rng.sample(StandardNormal);
                z * scale
            })
            .collect();
        Self {
            w,
            b: vec![0.0; out_dim],
            in_dim,
            out_dim,
        }
    }

    fn forward(&self, x: &[f64]) -> Vec<f64> {
        debug_assert_eq!(x.len(), self.in_dim);
        let mut z = self.b.clone();
        for i in 0..self.in_dim {
            let xi = x[i];
            if xi == 0.0 {
                continue;
            }
            let row = &self.w[i * self.out_dim..(i + 1) * self.out_dim];
            for (zj, wj) in z.iter_mut().zip(row) {
                *zj += xi * wj;
            }
        }
        z
    }
}

/// Gradient (or moment) storage for one layer.
#[derive(Debug, Clone)]
pub struct LayerGrad {
    pub dw: Vec<f64>,
    pub db: Vec<f64>,
}

impl LayerGrad {
    fn zeros_like(layer: &Dense) -> Self {
        Self {
            dw: vec![0.0; layer.w.len()],
            db: vec![0.0; layer.b.len()],
        }
    }

    fn sq_sum(&self) -> f64 {
        self.dw.iter().map(|g| g * g).sum::<f64>() + self.db.iter().map(|g| g * g).sum::<f64>()
    }

    fn scale(&mut self, s: f64) {
        for g in &mut self.dw {
            *g *= s;
        }
        for g in &mut self.db {
            *g *= s;
        }
    }
}

/// Parameter gradients for the whole network, one slot per layer.
#[derive(Debug, Clone)]
pub struct Gradients {
    pub l1: LayerGrad,
    pub l2: LayerGrad,
    pub heads: Vec<LayerGrad>,
    pub value: LayerGrad,
}

impl Gradients {
    pub fn zeros_like(net: &PolicyValueNet) -> Self {
        Self {
            l1: LayerGrad::zeros_like(&net.l1),
            l2: LayerGrad::zeros_like(&net.l2),
            heads: net.heads.iter().map(LayerGrad::zeros_like).collect(),
            value: LayerGrad::zeros_like(&net.value),
        }
    }

    pub fn global_norm(&self) -> f64 {
        let mut sum = self.l1.sq_sum() + self.l2.sq_sum() + self.value.sq_sum();
        for h in &self.heads {
            sum += h.sq_sum();
        }
        sum.sqrt()
    }

    fn scale(&mut self, s: f64) {
        self.l1.scale(s);
        self.l2.scale(s);
        for h in &mut self.heads {
            h.scale(s);
        }
        self.value.scale(s);
    }
}

/// Scale `grads` down so its global L2 norm is at most `max_norm`.
pub fn clip_global_norm(grads: &mut Gradients, max_norm: f64) {
    let norm = grads.global_norm();
    if norm > max_norm && norm > 0.0 {
        grads.scale(max_norm / norm);
    }
}

/// Cached activations from one forward pass, kept for the backward pass.
#[derive(Debug, Clone)]
pub struct ForwardPass {
    pub input: Vec<f64>,
    pub h1: Vec<f64>,
    pub h2: Vec<f64>,
    /// One logits vector per head, sized to that head's arm count.
    pub logits: Vec<Vec<f64>>,
    pub value: f64,
}

/// Shared-encoder multi-head policy network with a value head.
#[derive(Debug, Clone)]
pub struct PolicyValueNet {
    pub l1: Dense,
    pub l2: Dense,
    pub heads: Vec<Dense>,
    pub value: Dense,
}

impl PolicyValueNet {
    pub fn new(state_dim: usize, hidden: usize, head_sizes: &[usize], rng: &mut impl Rng) -> Self {
        Self {
            l1: Dense::new(state_dim, hidden, rng),
            l2: Dense::new(hidden, hidden, rng),
            heads: head_sizes
                .iter()
                .map(|&n| Dense::new(hidden, n, rng))
                .collect(),
            value: Dense::new(hidden, 1, rng),
        }
    }

    pub fn forward(&self, state: &[f64]) -> ForwardPass {
        let h1: Vec<f64> = self.l1.forward(state).iter().map(|z| z.tanh()).collect();
        let h2: Vec<f64> = self.l2.forward(&h1).iter().map(|z| z.tanh()).collect();
        let logits = self.heads.iter().map(|head| head.forward(&h2)).collect();
        let value = self.value.forward(&h2)[0];
        ForwardPass {
            input: state.to_vec(),
            h1,
            h2,
            logits,
            value,
        }
    }

    /// Accumulate parameter gradients for one sample.
    ///
    /// `d_logits[k][j]` is dL/d(logit j of head k) and `d_value` is
    /// dL/d(value output), both for the forward pass in `fwd`. Gradients
    /// are added into `grads` so a batch accumulates across calls.
    pub fn backward(
        &self,
        fwd: &ForwardPass,
        d_logits: &[Vec<f64>],
        d_value: f64,
        grads: &mut Gradients,
    ) {
        let hidden = self.l2.out_dim;
        let mut d_h2 = vec![0.0; hidden];

        for (k, head) in self.heads.iter().enumerate() {
            let hg = &mut grads.heads[k];
            for j in 0..head.out_dim {
                let g = d_logits[k][j];
                if g == 0.0 {
                    continue;
                }
                hg.db[j] += g;
                for i in 0..hidden {
                    hg.dw[i * head.out_dim + j] += fwd.h2[i] * g;
                    d_h2[i] += head.w[i * head.out_dim + j] * g;
                }
            }
        }

        if d_value != 0.0 {
            grads.value.db[0] += d_value;
            for i in 0..hidden {
                grads.value.dw[i] += fwd.h2[i] * d_value;
                d_h2[i] += self.value.w[i] * d_value;
            }
        }

        // tanh'(z) = 1 - tanh(z)^2, with tanh(z) already cached.
        let delta2: Vec<f64> = d_h2
            .iter()
            .zip(&fwd.h2)
            .map(|(d, h)| d * (1.0 - h * h))
            .collect();

        let mut d_h1 = vec![0.0; self.l1.out_dim];
        for j in 0..self.l2.out_dim {
            let g = delta2[j];
            if g == 0.0 {
                continue;
            }
            grads.l2.db[j] += g;
            for i in 0..self.l2.in_dim {
                grads.l2.dw[i * self.l2.out_dim + j] += fwd.h1[i] * g;
                d_h1[i] += self.l2.w[i * self.l2.out_dim + j] * g;
            }
        }

        let delta1: Vec<f64> = d_h1
            .iter()
            .zip(&fwd.h1)
            .map(|(d, h)| d * (1.0 - h * h))
            .collect();

        for j in 0..self.l1.out_dim {
            let g = delta1[j];
            if g == 0.0 {
                continue;
            }
            grads.l1.db[j] += g;
            for i in 0..self.l1.in_dim {
                grads.l1.dw[i * self.l1.out_dim + j] += fwd.input[i] * g;
            }
        }
    }
}

/// Adam with bias correction, moments shaped like the network gradients.
#[derive(Debug, Clone)]
pub struct Adam {
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    t: u64,
    m: Gradients,
    v: Gradients,
}

impl Adam {
    pub fn new(net: &PolicyValueNet, lr: f64) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            t: 0,
            m: Gradients::zeros_like(net),
            v: Gradients::zeros_like(net),
        }
    }

    pub fn step(&mut self, net: &mut PolicyValueNet, grads: &Gradients) {
        self.t += 1;
        let bc1 = 1.0 - self.beta1.powi(self.t as i32);
        let bc2 = 1.0 - self.beta2.powi(self.t as i32);
        let (b1, b2, eps, lr) = (self.beta1, self.beta2, self.eps, self.lr);

        let apply = |layer: &mut Dense, m: &mut LayerGrad, v: &mut LayerGrad, g: &LayerGrad| {
            for i in 0..layer.w.len() {
                m.dw[i] = b1 * m.dw[i] + (1.0 - b1) * g.dw[i];
                v.dw[i] = b2 * v.dw[i] + (1.0 - b2) * g.dw[i] * g.dw[i];
                let m_hat = m.dw[i] / bc1;
                let v_hat = v.dw[i] / bc2;
                layer.w[i] -= lr * m_hat / (v_hat.sqrt() + eps);
            }
            for i in 0..layer.b.len() {
                m.db[i] = b1 * m.db[i] + (1.0 - b1) * g.db[i];
                v.db[i] = b2 * v.db[i] + (1.0 - b2) * g.db[i] * g.db[i];
                let m_hat = m.db[i] / bc1;
                let v_hat = v.db[i] / bc2;
                layer.b[i] -= lr * m_hat / (v_hat.sqrt() + eps);
            }
        };

        apply(&mut net.l1, &mut self.m.l1, &mut self.v.l1, &grads.l1);
        apply(&mut net.l2, &mut self.m.l2, &mut self.v.l2, &grads.l2);
        for k in 0..net.heads.len() {
            apply(
                &mut net.heads[k],
                &mut self.m.heads[k],
                &mut self.v.heads[k],
                &grads.heads[k],
            );
        }
        apply(
            &mut net.value,
            &mut self.m.value,
            &mut self.v.value,
            &grads.value,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn tiny_net(seed: u64) -> PolicyValueNet {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        PolicyValueNet::new(2, 4, &[3, 2], &mut rng)
    }

    /// Scalar probe S = sum_k <c_k, logits_k> + c_v * value, linear in the
    /// outputs, so backward() with the c coefficients as upstream
    /// gradients must match finite differences of S.
    fn probe(net: &PolicyValueNet, x: &[f64], c: &[Vec<f64>], c_v: f64) -> f64 {
        let fwd = net.forward(x);
        let mut s = c_v * fwd.value;
        for (ck, logits) in c.iter().zip(&fwd.logits) {
            s += ck.iter().zip(logits).map(|(a, b)| a * b).sum::<f64>();
        }
        s
    }

    #[test]
    fn backward_matches_finite_differences() {
        let net = tiny_net(17);
        let x = vec![0.3, -0.7];
        let c = vec![vec![0.5, -1.0, 0.25], vec![2.0, -0.5]];
        let c_v = -0.75;

        let fwd = net.forward(&x);
        let mut grads = Gradients::zeros_like(&net);
        net.backward(&fwd, &c, c_v, &mut grads);

        let h = 1e-5;
        let check = |analytic: f64, mut bumped: PolicyValueNet, set: &dyn Fn(&mut PolicyValueNet, f64)| {
            set(&mut bumped, h);
            let up = probe(&bumped, &x, &c, c_v);
            set(&mut bumped, -2.0 * h);
            let down = probe(&bumped, &x, &c, c_v);
            let numeric = (up - down) / (2.0 * h);
            assert!(
                (analytic - numeric).abs() < 1e-6,
                "analytic {} vs numeric {}",
                analytic,
                numeric
            );
        };

        // One representative parameter per layer kind.
        check(grads.l1.dw[3], net.clone(), &|n, d| n.l1.w[3] += d);
        check(grads.l1.db[1], net.clone(), &|n, d| n.l1.b[1] += d);
        check(grads.l2.dw[7], net.clone(), &|n, d| n.l2.w[7] += d);
        check(grads.heads[0].dw[5], net.clone(), &|n, d| {
            n.heads[0].w[5] += d
        });
        check(grads.heads[1].db[0], net.clone(), &|n, d| {
            n.heads[1].b[0] += d
        });
        check(grads.value.dw[2], net.clone(), &|n, d| n.value.w[2] += d);
        check(grads.value.db[0], net.clone(), &|n, d| n.value.b[0] += d);
    }

    #[test]
    fn forward_outputs_are_finite_and_shaped() {
        let net = tiny_net(3);
        let fwd = net.forward(&[10.0, -10.0]);
        assert_eq!(fwd.logits.len(), 2);
        assert_eq!(fwd.logits[0].len(), 3);
        assert_eq!(fwd.logits[1].len(), 2);
        assert!(fwd.value.is_finite());
        for logits in &fwd.logits {
            assert!(logits.iter().all(|l| l.is_finite()));
        }
        assert!(fwd.h1.iter().all(|h| h.abs() <= 1.0));
    }

    #[test]
    fn seeded_init_is_deterministic() {
        let a = tiny_net(5);
        let b = tiny_net(5);
        assert_eq!(a.l1.w, b.l1.w);
        assert_eq!(a.heads[1].w, b.heads[1].w);
        assert_eq!(a.value.w, b.value.w);
    }

    #[test]
    fn global_norm_clip_rescales() {
        let net = tiny_net(9);
        let mut grads = Gradients::zeros_like(&net);
        for g in &mut grads.l1.dw {
            *g = 3.0;
        }
        let before = grads.global_norm();
        assert!(before > 0.5);
        clip_global_norm(&mut grads, 0.5);
        assert!((grads.global_norm() - 0.5).abs() < 1e-9);
        // Direction preserved.
        assert!(grads.l1.dw.iter().all(|&g| g > 0.0));
    }

    #[test]
    fn adam_steps_against_the_gradient() {
        let mut net = tiny_net(21);
        let mut adam = Adam::new(&net, 1e-3);
        let w_before = net.l1.w[0];
        let mut grads = Gradients::zeros_like(&net);
        grads.l1.dw[0] = 1.0;
        adam.step(&mut net, &grads);
        assert!(net.l1.w[0] < w_before);
    }
}
