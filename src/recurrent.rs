//! Recurrent Stack and Sequence Executor
//!
//! `n_layer` LSTM cells of equal width, unrolled over the time axis of a
//! window. This is the only place that iterates over time steps; callers
//! hand in one `[batch, features]` tensor per position and get back the top
//! layer's output per position plus the final [`RecurrentState`].
//!
//! ## State Hand-off
//!
//! ```text
//! window k-1                     window k
//! ... ─► (c, h) per layer ──────► initial state of window k ─► ...
//!              gradients stop here (truncated BPTT)
//! ```
//!
//! [`RecurrentStack::backward`] starts every layer with zero `dh`/`dc` at
//! the last position of the window, so no gradient crosses a window
//! boundary even though the state values do.

use crate::layers::lstm::{LstmCache, LstmGradients, TrainableLstmCell};
use crate::tensor::Tensor;
use rand::Rng;

/// Memory and output of one cell for a batch: both `[batch, cell_size]`
#[derive(Clone, Debug, PartialEq)]
pub struct LayerState {
    pub cell_memory: Tensor,
    pub hidden_output: Tensor,
}

/// Per-layer recurrent state, bottom layer first
#[derive(Clone, Debug, PartialEq)]
pub struct RecurrentState {
    pub layers: Vec<LayerState>,
}

impl RecurrentState {
    pub fn zeros(n_layer: usize, batch_size: usize, cell_size: usize) -> Self {
        let layers = (0..n_layer)
            .map(|_| LayerState {
                cell_memory: Tensor::zeros(vec![batch_size, cell_size]),
                hidden_output: Tensor::zeros(vec![batch_size, cell_size]),
            })
            .collect();
        Self { layers }
    }

    pub fn n_layer(&self) -> usize {
        self.layers.len()
    }

    pub fn batch_size(&self) -> usize {
        self.layers.first().map_or(0, |l| l.hidden_output.rows())
    }

    /// True when the state was built for this stack geometry
    pub fn fits(&self, n_layer: usize, batch_size: usize, cell_size: usize) -> bool {
        self.layers.len() == n_layer
            && self.layers.iter().all(|l| {
                l.cell_memory.shape == [batch_size, cell_size]
                    && l.hidden_output.shape == [batch_size, cell_size]
            })
    }

    pub fn is_zero(&self) -> bool {
        self.layers.iter().all(|l| {
            l.cell_memory.data.iter().all(|&v| v == 0.0)
                && l.hidden_output.data.iter().all(|&v| v == 0.0)
        })
    }
}

pub struct RecurrentStack {
    pub cells: Vec<TrainableLstmCell>,
    pub cell_size: usize,
}

impl RecurrentStack {
    /// Layer 0 reads `input_size` features, every other layer reads the
    /// previous layer's `cell_size` outputs
    pub fn new(input_size: usize, cell_size: usize, n_layer: usize, rng: &mut impl Rng) -> Self {
        let cells = (0..n_layer)
            .map(|l| {
                let in_size = if l == 0 { input_size } else { cell_size };
                TrainableLstmCell::new(in_size, cell_size, rng)
            })
            .collect();
        Self { cells, cell_size }
    }

    pub fn zeroed(input_size: usize, cell_size: usize, n_layer: usize) -> Self {
        let cells = (0..n_layer)
            .map(|l| {
                let in_size = if l == 0 { input_size } else { cell_size };
                TrainableLstmCell::zeroed(in_size, cell_size)
            })
            .collect();
        Self { cells, cell_size }
    }

    pub fn n_layer(&self) -> usize {
        self.cells.len()
    }

    pub fn zero_state(&self, batch_size: usize) -> RecurrentState {
        RecurrentState::zeros(self.n_layer(), batch_size, self.cell_size)
    }

    /// Unroll over `inputs` (one `[batch, in]` tensor per position), keeping
    /// what the backward pass needs
    pub fn run(&self, inputs: &[Tensor], initial: &RecurrentState) -> (Vec<Tensor>, RecurrentState, StackCache) {
        let (outputs, state, steps) = self.unroll(inputs, initial, true);
        (outputs, state, StackCache { steps })
    }

    /// Unroll without caching, for inference
    pub fn infer(&self, inputs: &[Tensor], initial: &RecurrentState) -> (Vec<Tensor>, RecurrentState) {
        let (outputs, state, _) = self.unroll(inputs, initial, false);
        (outputs, state)
    }

    fn unroll(
        &self,
        inputs: &[Tensor],
        initial: &RecurrentState,
        keep_cache: bool,
    ) -> (Vec<Tensor>, RecurrentState, Vec<Vec<LstmCache>>) {
        assert_eq!(
            initial.n_layer(),
            self.n_layer(),
            "state has {} layers, stack has {}",
            initial.n_layer(),
            self.n_layer()
        );

        let mut state = initial.clone();
        let mut steps: Vec<Vec<LstmCache>> = (0..self.n_layer()).map(|_| Vec::new()).collect();
        let mut outputs = Vec::with_capacity(inputs.len());

        for x in inputs {
            let mut layer_input = x.clone();
            for (l, cell) in self.cells.iter().enumerate() {
                let prev = &state.layers[l];
                let (h, c, cache) = cell.forward(&layer_input, &prev.hidden_output, &prev.cell_memory);
                if keep_cache {
                    steps[l].push(cache);
                }
                state.layers[l] = LayerState {
                    cell_memory: c,
                    hidden_output: h.clone(),
                };
                layer_input = h;
            }
            outputs.push(layer_input);
        }

        (outputs, state, steps)
    }

    /// Backpropagate through the window
    ///
    /// `grad_outputs[t]` is the loss gradient w.r.t. the top layer's output
    /// at position `t`. Returns per-layer parameter gradients and the
    /// gradient w.r.t. each position's input to layer 0.
    pub fn backward(&self, grad_outputs: &[Tensor], cache: &StackCache) -> (Vec<LstmGradients>, Vec<Tensor>) {
        let mut grads: Vec<LstmGradients> = self.cells.iter().map(LstmGradients::zeros_like).collect();
        let mut grad_from_above: Vec<Tensor> = grad_outputs.to_vec();

        for (l, cell) in self.cells.iter().enumerate().rev() {
            let layer_steps = &cache.steps[l];
            let batch_size = grad_from_above.first().map_or(0, Tensor::rows);

            // Nothing flows in from beyond the window
            let mut dh_next = Tensor::zeros(vec![batch_size, self.cell_size]);
            let mut dc_next = Tensor::zeros(vec![batch_size, self.cell_size]);
            let mut grad_inputs: Vec<Tensor> = Vec::with_capacity(layer_steps.len());

            for t in (0..layer_steps.len()).rev() {
                let dh = grad_from_above[t].add(&dh_next);
                let (dx, dh_prev, dc_prev) = cell.backward(&dh, &dc_next, &layer_steps[t], &mut grads[l]);
                grad_inputs.push(dx);
                dh_next = dh_prev;
                dc_next = dc_prev;
            }
            grad_inputs.reverse();
            grad_from_above = grad_inputs;
        }

        (grads, grad_from_above)
    }
}

/// Forward caches indexed `[layer][position]`
pub struct StackCache {
    steps: Vec<Vec<LstmCache>>,
}
