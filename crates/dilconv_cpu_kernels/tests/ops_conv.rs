use dilconv_cpu_kernels::*;
use half::bf16;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};

fn approx(v: Vec<f32>, digits: i32) -> Vec<f32> {
    let b = 10f32.powi(digits);
    v.iter().map(|t| f32::round(t * b) / b).collect()
}

fn randn(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).unwrap();
    (0..n).map(|_| normal.sample(&mut rng)).collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[test]
fn test_conv3d_relu_ones_f32() {
    let geom = ConvGeometry::<3> {
        batch: 1,
        in_channels: 1,
        out_channels: 1,
        spatial: [5, 5, 5],
        dilation: 1,
    };
    let input = vec![1.0f32; geom.input_len()];
    let weight = vec![1.0f32; geom.weight_len()];
    let bias = [0.0f32];
    let mut output = vec![-1.0f32; geom.output_len()];

    call_ops_conv(
        conv3d_relu::F32,
        &input,
        &weight,
        &bias,
        &mut output,
        &geom.to_metadata(geom.output_len()),
        &LaunchConfig::default(),
    )
    .unwrap();

    assert_eq!(approx(output, 4), vec![27.0; 125]);
}

#[test]
fn test_conv3d_relu_ones_bf16() {
    let geom = ConvGeometry::<3> {
        batch: 1,
        in_channels: 1,
        out_channels: 1,
        spatial: [5, 5, 5],
        dilation: 1,
    };
    let input = vec![bf16::from_f32(1.0); geom.input_len()];
    let weight = vec![bf16::from_f32(1.0); geom.weight_len()];
    let bias = [bf16::from_f32(0.0)];
    let mut output = vec![bf16::from_f32(0.0); geom.output_len()];

    call_ops_conv(
        conv3d_relu::BF16,
        &input,
        &weight,
        &bias,
        &mut output,
        &geom.to_metadata(geom.output_len()),
        &LaunchConfig::default(),
    )
    .unwrap();

    assert!(output.iter().all(|v| v.to_f32() == 27.0));
}

#[test]
fn test_conv2d_single_tap_reflects_at_edge() {
    // Only the (center row, left column) tap is set: y[r][c] = x[r][reflect(c - 1)].
    let geom = ConvGeometry::<2> {
        batch: 1,
        in_channels: 1,
        out_channels: 1,
        spatial: [3, 3],
        dilation: 1,
    };
    let input = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
    let weight = [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0];
    let bias = [0.0f32];
    let mut output = vec![0.0f32; 9];

    call_ops_conv(
        conv2d::F32,
        &input,
        &weight,
        &bias,
        &mut output,
        &geom.to_metadata(9),
        &LaunchConfig::default(),
    )
    .unwrap();

    assert_eq!(approx(output, 4), vec![1.0, 1.0, 2.0, 4.0, 4.0, 5.0, 7.0, 7.0, 8.0]);
}

#[test]
fn test_conv2d_dilated_tap_bounces() {
    // Extent 4, dilation 5: the left tap of column c reads reflect(c - 5).
    let geom = ConvGeometry::<2> {
        batch: 1,
        in_channels: 1,
        out_channels: 1,
        spatial: [1, 4],
        dilation: 5,
    };
    let input = [10.0f32, 20.0, 30.0, 40.0];
    let weight = [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0];
    let bias = [0.5f32];
    let mut output = vec![0.0f32; 4];

    call_ops_conv(
        conv2d::F32,
        &input,
        &weight,
        &bias,
        &mut output,
        &geom.to_metadata(4),
        &LaunchConfig::default(),
    )
    .unwrap();

    let expected: Vec<f32> = (0..4)
        .map(|c| input[reflect(c as isize - 5, 4)] + 0.5)
        .collect();
    assert_eq!(output, expected);
    // c = 0 reads -5 -> 4 bounces twice and lands on index 3
    assert_eq!(output[0], 40.5);
}

#[test]
fn test_conv2d_relu_clamps() {
    let geom = ConvGeometry::<2> {
        batch: 1,
        in_channels: 1,
        out_channels: 2,
        spatial: [2, 2],
        dilation: 1,
    };
    let input = [1.0f32, -2.0, 3.0, -4.0];
    let mut weight = vec![0.0f32; geom.weight_len()];
    weight[4] = -1.0; // out channel 0: negated center tap
    weight[9 + 4] = 1.0; // out channel 1: center tap
    let bias = [0.0f32, 0.0];
    let mut output = vec![7.0f32; geom.output_len()];

    call_ops_conv(
        conv2d_relu::F32,
        &input,
        &weight,
        &bias,
        &mut output,
        &geom.to_metadata(geom.output_len()),
        &LaunchConfig::default(),
    )
    .unwrap();

    assert_eq!(approx(output, 4), vec![0.0, 2.0, 0.0, 4.0, 1.0, 0.0, 3.0, 0.0]);
}

#[test]
fn test_zero_conv_overwrites_output() {
    let geom = ConvGeometry::<3> {
        batch: 1,
        in_channels: 1,
        out_channels: 1,
        spatial: [5, 5, 5],
        dilation: 1,
    };
    let input = vec![0.0f32; geom.input_len()];
    let weight = vec![0.0f32; geom.weight_len()];
    let bias = [0.0f32];
    let mut output = vec![1.0f32; geom.output_len()];

    call_ops_conv(
        conv3d_relu::F32,
        &input,
        &weight,
        &bias,
        &mut output,
        &geom.to_metadata(geom.output_len()),
        &LaunchConfig::default(),
    )
    .unwrap();

    assert_eq!(output.iter().sum::<f32>(), 0.0);
}

#[test]
fn test_minimum_extent_conv() {
    let geom = ConvGeometry::<3> {
        batch: 1,
        in_channels: 2,
        out_channels: 1,
        spatial: [1, 1, 1],
        dilation: 7,
    };
    let input = [2.0f64, 3.0];
    let weight = vec![1.0f64; geom.weight_len()];
    let bias = [1.0f64];
    let mut output = vec![0.0f64; 1];

    call_ops_conv(
        conv3d::F64,
        &input,
        &weight,
        &bias,
        &mut output,
        &geom.to_metadata(1),
        &LaunchConfig::default(),
    )
    .unwrap();

    // every tap reads the single element
    assert_eq!(output, vec![27.0 * 5.0 + 1.0]);
}

#[test]
fn test_backward_bias_sums_batch_and_space() {
    let geom = ConvGeometry::<2> {
        batch: 2,
        in_channels: 1,
        out_channels: 3,
        spatial: [4, 5],
        dilation: 2,
    };
    let grad_output: Vec<f32> = (0..geom.output_len()).map(|i| (i / 20) as f32 + 1.0).collect();
    let mut grad_bias = vec![99.0f32; 3];

    call_ops_conv_grad_bias(
        conv2d_backward_bias::F32,
        &grad_output,
        &mut grad_bias,
        &geom.to_metadata(3),
        &LaunchConfig::default(),
    )
    .unwrap();

    // planes are numbered b * 3 + co, each plane holds 20 copies of (plane + 1)
    assert_eq!(grad_bias, vec![20.0 * (1.0 + 4.0), 20.0 * (2.0 + 5.0), 20.0 * (3.0 + 6.0)]);
}

#[test]
fn test_backward_kernel_ones() {
    let geom = ConvGeometry::<2> {
        batch: 2,
        in_channels: 2,
        out_channels: 1,
        spatial: [3, 4],
        dilation: 3,
    };
    let input = vec![1.0f32; geom.input_len()];
    let grad_output = vec![1.0f32; geom.output_len()];
    let mut grad_weight = vec![-5.0f32; geom.weight_len()];

    call_ops_conv_grad_weight(
        conv2d_backward_kernel::F32,
        &input,
        &grad_output,
        &mut grad_weight,
        &geom.to_metadata(geom.weight_len()),
        &LaunchConfig::default(),
    )
    .unwrap();

    assert_eq!(grad_weight, vec![24.0; 18]);
}

#[test]
fn test_backward_input_is_adjoint_of_forward() {
    for (spatial, dilation) in [([6, 7, 5], 1), ([4, 9, 3], 3), ([5, 3, 8], 10)] {
        let geom = ConvGeometry::<3> {
            batch: 2,
            in_channels: 3,
            out_channels: 2,
            spatial,
            dilation,
        };
        let x = randn(geom.input_len(), 1);
        let k = randn(geom.weight_len(), 2);
        let dy = randn(geom.output_len(), 3);
        let bias = vec![0.0f64; geom.out_channels];
        let cfg = LaunchConfig::default();

        let mut y = vec![0.0f64; geom.output_len()];
        call_ops_conv(conv3d::F64, &x, &k, &bias, &mut y, &geom.to_metadata(geom.output_len()), &cfg).unwrap();

        let mut dx = vec![0.0f64; geom.input_len()];
        call_ops_conv_grad_input(
            conv3d_backward_input::F64,
            &k,
            &dy,
            &mut dx,
            &geom.to_metadata(geom.input_len()),
            &cfg,
        )
        .unwrap();

        let mut dk = vec![0.0f64; geom.weight_len()];
        call_ops_conv_grad_weight(
            conv3d_backward_kernel::F64,
            &x,
            &dy,
            &mut dk,
            &geom.to_metadata(geom.weight_len()),
            &cfg,
        )
        .unwrap();

        // <conv(x; k), dy> == <x, conv_x^T(dy)> == <k, conv_k^T(x, dy)>
        let lhs = dot(&y, &dy);
        assert!((lhs - dot(&x, &dx)).abs() < 1e-9 * lhs.abs().max(1.0));
        assert!((lhs - dot(&k, &dk)).abs() < 1e-9 * lhs.abs().max(1.0));
    }
}

#[test]
fn test_backward_input_2d_center_tap_is_identity() {
    let geom = ConvGeometry::<2> {
        batch: 1,
        in_channels: 1,
        out_channels: 1,
        spatial: [4, 4],
        dilation: 2,
    };
    let mut weight = vec![0.0f32; 9];
    weight[4] = 1.0;
    let grad_output: Vec<f32> = (0..16).map(|i| i as f32).collect();
    let mut grad_input = vec![3.0f32; 16];

    call_ops_conv_grad_input(
        conv2d_backward_input::F32,
        &weight,
        &grad_output,
        &mut grad_input,
        &geom.to_metadata(16),
        &LaunchConfig::default(),
    )
    .unwrap();

    assert_eq!(grad_input, grad_output);
}

#[test]
fn test_relu_mask() {
    let output = [0.0f32, 1.5, 0.0, 2.0];
    let grad_output = [1.0f32, 2.0, 3.0, 4.0];
    let mut masked = [9.0f32; 4];

    call_ops_relu_mask(
        relu_mask::F32,
        &output,
        &grad_output,
        &mut masked,
        &[4],
        &LaunchConfig::default(),
    )
    .unwrap();

    assert_eq!(masked, [0.0, 2.0, 0.0, 4.0]);
}

#[test]
fn test_results_independent_of_scheduling() {
    let geom = ConvGeometry::<3> {
        batch: 3,
        in_channels: 2,
        out_channels: 2,
        spatial: [5, 6, 7],
        dilation: 2,
    };
    let x: Vec<f32> = randn(geom.input_len(), 11).into_iter().map(|v| v as f32).collect();
    let dy: Vec<f32> = randn(geom.output_len(), 12).into_iter().map(|v| v as f32).collect();
    let k: Vec<f32> = randn(geom.weight_len(), 13).into_iter().map(|v| v as f32).collect();

    let run = |threads: usize, block_size: usize| {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build().unwrap();
        pool.install(|| {
            let cfg = LaunchConfig::new(block_size);
            let mut dk = vec![0.0f32; geom.weight_len()];
            call_ops_conv_grad_weight(
                conv3d_backward_kernel::F32,
                &x,
                &dy,
                &mut dk,
                &geom.to_metadata(geom.weight_len()),
                &cfg,
            )
            .unwrap();
            let mut dx = vec![0.0f32; geom.input_len()];
            call_ops_conv_grad_input(
                conv3d_backward_input::F32,
                &k,
                &dy,
                &mut dx,
                &geom.to_metadata(geom.input_len()),
                &cfg,
            )
            .unwrap();
            let mut db = vec![0.0f32; geom.out_channels];
            call_ops_conv_grad_bias(conv3d_backward_bias::F32, &dy, &mut db, &geom.to_metadata(2), &cfg).unwrap();
            (dk, dx, db)
        })
    };

    let reference = run(1, 1);
    for (threads, block_size) in [(2, 7), (4, 256), (3, 4096)] {
        let (dk, dx, db) = run(threads, block_size);
        assert!(dk.iter().zip(&reference.0).all(|(a, b)| a.to_bits() == b.to_bits()));
        assert!(dx.iter().zip(&reference.1).all(|(a, b)| a.to_bits() == b.to_bits()));
        assert!(db.iter().zip(&reference.2).all(|(a, b)| a.to_bits() == b.to_bits()));
    }
}

#[test]
fn test_kernel_dtype_mismatch() {
    let geom = ConvGeometry::<3> {
        batch: 1,
        in_channels: 1,
        out_channels: 1,
        spatial: [5, 5, 5],
        dilation: 1,
    };
    let input = vec![0.0f64; geom.input_len()];
    let weight = vec![0.0f64; geom.weight_len()];
    let bias = [0.0f64];
    let mut output = vec![0.0f64; geom.output_len()];

    let err = call_ops_conv(
        conv3d_relu::F32,
        &input,
        &weight,
        &bias,
        &mut output,
        &geom.to_metadata(geom.output_len()),
        &LaunchConfig::default(),
    )
    .unwrap_err();

    assert!(matches!(err, CpuKernelError::InvalidKernel(_)));
}

#[test]
fn test_invalid_launch_arguments() {
    let geom = ConvGeometry::<2> {
        batch: 1,
        in_channels: 1,
        out_channels: 1,
        spatial: [3, 3],
        dilation: 1,
    };
    let input = vec![0.0f32; 9];
    let weight = vec![0.0f32; 9];
    let bias = [0.0f32];
    let mut output = vec![0.0f32; 9];
    let cfg = LaunchConfig::default();

    // wrong num_els
    let err = call_ops_conv(conv2d::F32, &input, &weight, &bias, &mut output, &geom.to_metadata(8), &cfg);
    assert!(matches!(err, Err(CpuKernelError::InvalidInput(_))));

    // rank mismatch between kernel and metadata
    let err = call_ops_conv(conv3d::F32, &input, &weight, &bias, &mut output, &geom.to_metadata(9), &cfg);
    assert!(matches!(err, Err(CpuKernelError::InvalidInput(_))));

    // wrong family
    let err = call_ops_conv(
        conv2d_backward_input::F32,
        &input,
        &weight,
        &bias,
        &mut output,
        &geom.to_metadata(9),
        &cfg,
    );
    assert!(matches!(err, Err(CpuKernelError::InvalidKernel(_))));

    // short weight slice
    let err = call_ops_conv(conv2d::F32, &input, &weight[..8], &bias, &mut output, &geom.to_metadata(9), &cfg);
    assert!(matches!(err, Err(CpuKernelError::InvalidInput(_))));
}
