#![allow(dead_code, clippy::too_many_arguments)]

use dilconv_core::prelude::*;
use std::sync::Once;

pub fn init_logger() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

pub fn nc_shape(batch: usize, channels: usize, spatial: &[usize]) -> Vec<usize> {
    let mut dims = vec![batch, channels];
    dims.extend_from_slice(spatial);
    dims
}

pub fn kernel_shape(out_channels: usize, in_channels: usize, rank: usize) -> Vec<usize> {
    let mut dims = vec![out_channels, in_channels];
    dims.resize(2 + rank, 3);
    dims
}

/// Row-major unravel of `linear` over `dims`.
pub fn unravel(mut linear: usize, dims: &[usize]) -> Vec<usize> {
    let mut coords = vec![0; dims.len()];
    for axis in (0..dims.len()).rev() {
        coords[axis] = linear % dims[axis];
        linear /= dims[axis];
    }
    coords
}

pub fn ravel(coords: &[usize], dims: &[usize]) -> usize {
    coords.iter().zip(dims).fold(0, |acc, (&c, &d)| acc * d + c)
}

/// Dilated 3-tap convolution + ReLU with zero padding of width `dilation`,
/// evaluated in f64 at one output element.
pub fn zero_padded_reference(
    input: &[f64],
    input_dims: &[usize],
    kernel: &[f64],
    bias: &[f64],
    batch: usize,
    out_channel: usize,
    position: &[usize],
    dilation: usize,
) -> f64 {
    let in_channels = input_dims[1];
    let spatial = &input_dims[2..];
    let rank = spatial.len();
    let taps = 3usize.pow(rank as u32);

    let mut acc = bias[out_channel];
    for ci in 0..in_channels {
        'taps: for tap in 0..taps {
            let digits = unravel(tap, &vec![3; rank]);
            let mut coords = vec![batch, ci];
            for axis in 0..rank {
                let c = position[axis] as isize + (digits[axis] as isize - 1) * dilation as isize;
                if c < 0 || c >= spatial[axis] as isize {
                    continue 'taps;
                }
                coords.push(c as usize);
            }
            let w = kernel[(out_channel * in_channels + ci) * taps + tap];
            acc += w * input[ravel(&coords, input_dims)];
        }
    }
    acc.max(0.0)
}

/// Whether every spatial coordinate is at least `dilation` away from both
/// boundaries.
pub fn is_center(position: &[usize], spatial: &[usize], dilation: usize) -> bool {
    position
        .iter()
        .zip(spatial)
        .all(|(&p, &n)| p >= dilation && p + dilation < n)
}

/// `sum(forward(x, k, b) * weights)` in f64.
pub fn weighted_loss(
    input: &Tensor,
    kernel: &Tensor,
    bias: &Tensor,
    weights: &[f64],
    dilation: usize,
    activation: Activation,
) -> f64 {
    let dims = input.shape().dims();
    let mut output = Tensor::zeros(nc_shape(dims[0], kernel.shape()[0], &dims[2..]), DType::F64).unwrap();
    conv_forward(input, kernel, bias, &mut output, dilation, activation).unwrap();
    output
        .to_vec::<f64>()
        .unwrap()
        .iter()
        .zip(weights)
        .map(|(y, w)| y * w)
        .sum()
}

/// `tensor` with element `index` moved by `delta`.
pub fn perturbed(tensor: &Tensor, index: usize, delta: f64) -> Tensor {
    let mut data = tensor.to_vec::<f64>().unwrap();
    data[index] += delta;
    Tensor::from_vec(data, tensor.shape().clone()).unwrap()
}

/// Sign pattern of the pre-activation output.
pub fn pre_activation_signs(input: &Tensor, kernel: &Tensor, bias: &Tensor, dilation: usize) -> Vec<bool> {
    let dims = input.shape().dims();
    let mut output = Tensor::zeros(nc_shape(dims[0], kernel.shape()[0], &dims[2..]), DType::F64).unwrap();
    conv_forward(input, kernel, bias, &mut output, dilation, Activation::Identity).unwrap();
    output.to_vec::<f64>().unwrap().iter().map(|&v| v > 0.0).collect()
}

pub fn assert_close(actual: &[f64], expected: &[f64], tolerance: f64) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        let scale = 1.0f64.max(e.abs());
        assert!(
            (a - e).abs() <= tolerance * scale,
            "element {}: {} vs {} (tolerance {})",
            i,
            a,
            e,
            tolerance
        );
    }
}
