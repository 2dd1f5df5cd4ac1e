//! Reflective dilated convolution kernels
//!
//! This module provides:
//! - The fused forward convolution + activation
//! - Gradient with respect to the input (gather through the inverse addressing)
//! - Gradients with respect to the weights and the bias
//! - The activation-derivative mask applied to upstream gradients
//!
//! All kernels are generic over the spatial rank `N` and the element type, and
//! address the input exclusively through [`ReflectedAxis`] tables.
//!
//! Accumulation discipline: no two parallel units ever write the same element.
//! Backward-input gathers contributions per input element in a fixed order;
//! weight and bias gradients compute one partial sum per batch item and merge
//! the partials in batch order. Results are bit-reproducible for any thread
//! count or block size.
//!
//! Every kernel overwrites its destination.

use crate::{
    config::LaunchConfig,
    error::{CpuKernelError, Result},
    kernels::{
        activation::Activation,
        float::KernelFloat,
        geometry::{for_each_source, ConvGeometry},
        reflect::{ReflectedAxis, TapSource, TAPS_PER_AXIS},
    },
};
use rayon::prelude::*;

fn check_len(name: &str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(CpuKernelError::InvalidInput(format!(
            "{} has {} elements, geometry requires {}",
            name, got, expected
        )));
    }
    Ok(())
}

/// Input plane offsets of the three taps along each axis at `coords`.
#[inline]
fn tap_offsets<const N: usize>(
    axes: &[ReflectedAxis; N],
    strides: &[usize; N],
    coords: &[usize; N],
) -> [[usize; TAPS_PER_AXIS]; N] {
    let mut offsets = [[0usize; TAPS_PER_AXIS]; N];
    for a in 0..N {
        for t in 0..TAPS_PER_AXIS {
            offsets[a][t] = axes[a].input_of(coords[a], t) * strides[a];
        }
    }
    offsets
}

/// Forward convolution + activation, written in place into `output`.
pub fn conv_forward_map<T: KernelFloat, const N: usize>(
    geom: &ConvGeometry<N>,
    input: &[T],
    weight: &[T],
    bias: &[T],
    output: &mut [T],
    activation: Activation,
    config: &LaunchConfig,
) -> Result<()> {
    geom.validate()?;
    check_len("input", input.len(), geom.input_len())?;
    check_len("weight", weight.len(), geom.weight_len())?;
    check_len("bias", bias.len(), geom.out_channels)?;
    check_len("output", output.len(), geom.output_len())?;

    let spatial_size = geom.spatial_size();
    let taps = geom.taps();
    let axes = geom.axes();
    let strides = geom.spatial_strides();
    let tap_digits: Vec<[usize; N]> = (0..taps).map(|t| geom.tap_digits(t)).collect();

    output
        .par_chunks_mut(spatial_size)
        .enumerate()
        .for_each(|(plane, out_plane)| {
            let b = plane / geom.out_channels;
            let co = plane % geom.out_channels;
            let bias_val = bias[co];

            out_plane
                .par_iter_mut()
                .with_min_len(config.block_size)
                .enumerate()
                .for_each(|(pos, out)| {
                    let offsets = tap_offsets(&axes, &strides, &geom.unravel(pos));
                    let mut sum = T::zero();

                    for ci in 0..geom.in_channels {
                        let x = &input[(b * geom.in_channels + ci) * spatial_size..][..spatial_size];
                        let w = &weight[(co * geom.in_channels + ci) * taps..][..taps];

                        for (tap, digits) in tap_digits.iter().enumerate() {
                            let mut idx = 0;
                            for a in 0..N {
                                idx += offsets[a][digits[a]];
                            }
                            sum = sum + w[tap] * x[idx];
                        }
                    }

                    *out = activation.apply(sum + bias_val);
                });
        });

    Ok(())
}

/// Gradient with respect to the input.
///
/// `grad_output` must already be masked by the activation derivative.
pub fn conv_backward_input_map<T: KernelFloat, const N: usize>(
    geom: &ConvGeometry<N>,
    weight: &[T],
    grad_output: &[T],
    grad_input: &mut [T],
    config: &LaunchConfig,
) -> Result<()> {
    geom.validate()?;
    check_len("weight", weight.len(), geom.weight_len())?;
    check_len("grad_output", grad_output.len(), geom.output_len())?;
    check_len("grad_input", grad_input.len(), geom.input_len())?;

    let spatial_size = geom.spatial_size();
    let taps = geom.taps();
    let axes = geom.axes();
    let spatial_strides = geom.spatial_strides();
    let tap_strides = geom.tap_strides();

    grad_input
        .par_chunks_mut(spatial_size)
        .enumerate()
        .for_each(|(plane, grad_plane)| {
            let b = plane / geom.in_channels;
            let ci = plane % geom.in_channels;

            grad_plane
                .par_iter_mut()
                .with_min_len(config.block_size)
                .enumerate()
                .for_each(|(pos, grad)| {
                    let coords = geom.unravel(pos);
                    let sources: [&[TapSource]; N] = core::array::from_fn(|a| axes[a].sources_of(coords[a]));
                    let mut sum = T::zero();

                    for co in 0..geom.out_channels {
                        let dy = &grad_output[(b * geom.out_channels + co) * spatial_size..][..spatial_size];
                        let w = &weight[(co * geom.in_channels + ci) * taps..][..taps];

                        for_each_source(&sources, &tap_strides, &spatial_strides, |tap, out_pos| {
                            sum = sum + w[tap] * dy[out_pos];
                        });
                    }

                    *grad = sum;
                });
        });

    Ok(())
}

/// Gradient with respect to the weights.
///
/// `grad_output` must already be masked by the activation derivative.
pub fn conv_backward_kernel_map<T: KernelFloat, const N: usize>(
    geom: &ConvGeometry<N>,
    input: &[T],
    grad_output: &[T],
    grad_weight: &mut [T],
    config: &LaunchConfig,
) -> Result<()> {
    geom.validate()?;
    check_len("input", input.len(), geom.input_len())?;
    check_len("grad_output", grad_output.len(), geom.output_len())?;
    check_len("grad_weight", grad_weight.len(), geom.weight_len())?;

    let spatial_size = geom.spatial_size();
    let taps = geom.taps();
    let axes = geom.axes();
    let strides = geom.spatial_strides();

    grad_weight
        .par_iter_mut()
        .with_min_len(reduction_units_per_block(geom, config))
        .enumerate()
        .for_each(|(w_idx, grad)| {
            let tap = w_idx % taps;
            let ci = (w_idx / taps) % geom.in_channels;
            let co = w_idx / (taps * geom.in_channels);
            let digits = geom.tap_digits(tap);

            let partials: Vec<T> = (0..geom.batch)
                .into_par_iter()
                .map(|b| {
                    let x = &input[(b * geom.in_channels + ci) * spatial_size..][..spatial_size];
                    let dy = &grad_output[(b * geom.out_channels + co) * spatial_size..][..spatial_size];
                    let mut sum = T::zero();

                    for (pos, &g) in dy.iter().enumerate() {
                        let coords = geom.unravel(pos);
                        let mut idx = 0;
                        for a in 0..N {
                            idx += axes[a].input_of(coords[a], digits[a]) * strides[a];
                        }
                        sum = sum + x[idx] * g;
                    }

                    sum
                })
                .collect();

            *grad = partials.into_iter().fold(T::zero(), |acc, p| acc + p);
        });

    Ok(())
}

/// Gradient with respect to the bias.
///
/// `grad_output` must already be masked by the activation derivative.
pub fn conv_backward_bias_map<T: KernelFloat, const N: usize>(
    geom: &ConvGeometry<N>,
    grad_output: &[T],
    grad_bias: &mut [T],
    config: &LaunchConfig,
) -> Result<()> {
    geom.validate()?;
    check_len("grad_output", grad_output.len(), geom.output_len())?;
    check_len("grad_bias", grad_bias.len(), geom.out_channels)?;

    let spatial_size = geom.spatial_size();

    grad_bias
        .par_iter_mut()
        .with_min_len(reduction_units_per_block(geom, config))
        .enumerate()
        .for_each(|(co, grad)| {
            let partials: Vec<T> = (0..geom.batch)
                .into_par_iter()
                .map(|b| {
                    grad_output[(b * geom.out_channels + co) * spatial_size..][..spatial_size]
                        .iter()
                        .fold(T::zero(), |acc, &g| acc + g)
                })
                .collect();

            *grad = partials.into_iter().fold(T::zero(), |acc, p| acc + p);
        });

    Ok(())
}

/// Weight and bias gradients each reduce `batch * spatial_size` upstream
/// elements, so one block holds `block_size` of those elements.
fn reduction_units_per_block<const N: usize>(geom: &ConvGeometry<N>, config: &LaunchConfig) -> usize {
    (config.block_size / (geom.batch * geom.spatial_size()).max(1)).max(1)
}

/// `masked[i] = grad_output[i]` where the activation passed `output[i]`
/// through, zero where it clamped.
pub fn activation_mask_map<T: KernelFloat>(
    output: &[T],
    grad_output: &[T],
    masked: &mut [T],
    activation: Activation,
    config: &LaunchConfig,
) -> Result<()> {
    check_len("grad_output", grad_output.len(), output.len())?;
    check_len("masked", masked.len(), output.len())?;

    masked
        .par_iter_mut()
        .zip(output.par_iter().zip(grad_output.par_iter()))
        .with_min_len(config.block_size)
        .for_each(|(m, (&y, &g))| *m = activation.mask(y, g));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduction_blocks_scale_with_reduced_elements() {
        let geom = ConvGeometry::<2> {
            batch: 2,
            in_channels: 1,
            out_channels: 4,
            spatial: [4, 4],
            dilation: 1,
        };
        assert_eq!(reduction_units_per_block(&geom, &LaunchConfig::new(32)), 1);
        assert_eq!(reduction_units_per_block(&geom, &LaunchConfig::new(128)), 4);
        assert_eq!(reduction_units_per_block(&geom, &LaunchConfig::new(1)), 1);
    }
}
