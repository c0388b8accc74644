use approx::assert_abs_diff_eq;
use ndarray::{Array1, Axis, Ix1, Ix2};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::nn::grad_check::{eval_numerical_gradient_array, rel_error};
use crate::nn::layers::{layer_norm_backward, layer_norm_forward};
use crate::nn::Init;

const EPS: f64 = 1e-5;

fn seeded2(shape: [usize; 2], seed: u64) -> ndarray::Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Init::Normal { mean: -1.0, std: 2.0 }
        .generate(&shape, &mut rng)
        .into_dimensionality::<Ix2>()
        .unwrap()
}

/// 测试层归一化：每个样本自身近似零均值单位方差
#[test]
fn test_layer_norm_forward_normalizes_per_sample() {
    let x = seeded2([5, 40], 51);
    let gamma = Array1::from_elem(40, 1.0);
    let beta = Array1::zeros(40);
    let (out, _) = layer_norm_forward(&x, &gamma, &beta, EPS);

    let mean = out.mean_axis(Axis(1)).unwrap();
    let var = out.var_axis(Axis(1), 0.0);
    for i in 0..5 {
        assert_abs_diff_eq!(mean[i], 0.0, epsilon = 1e-8);
        assert_abs_diff_eq!(var[i], 1.0, epsilon = 1e-4);
    }
}

/// 测试层归一化与批量无关：单独处理一个样本与批量内处理结果一致
#[test]
fn test_layer_norm_forward_batch_independent() {
    let x = seeded2([4, 6], 52);
    let gamma = Array1::from_elem(6, 1.0);
    let beta = Array1::zeros(6);
    let (out_batch, _) = layer_norm_forward(&x, &gamma, &beta, EPS);

    for i in 0..4 {
        let row = x.row(i).insert_axis(Axis(0)).to_owned();
        let (out_row, _) = layer_norm_forward(&row, &gamma, &beta, EPS);
        assert_abs_diff_eq!(out_batch.row(i), out_row.row(0), epsilon = 1e-12);
    }
}

/// 测试层归一化反向传播与数值梯度一致
#[test]
fn test_layer_norm_backward_matches_numerical() {
    let x = seeded2([6, 5], 53);
    let mut rng = StdRng::seed_from_u64(54);
    let gamma = Init::Normal { mean: 1.0, std: 0.2 }
        .generate(&[5], &mut rng)
        .into_dimensionality::<Ix1>()
        .unwrap();
    let beta = Init::Normal { mean: 0.0, std: 0.5 }
        .generate(&[5], &mut rng)
        .into_dimensionality::<Ix1>()
        .unwrap();
    let dout = seeded2([6, 5], 55);

    let (_, cache) = layer_norm_forward(&x, &gamma, &beta, EPS);
    let (dx, dgamma, dbeta) = layer_norm_backward(&dout, cache);

    let dout_dyn = dout.clone().into_dyn();
    let dx_num = eval_numerical_gradient_array(
        |xp| {
            let xp = xp.clone().into_dimensionality::<Ix2>().unwrap();
            layer_norm_forward(&xp, &gamma, &beta, EPS).0.into_dyn()
        },
        &x.clone().into_dyn(),
        &dout_dyn,
        1e-5,
    );
    let dgamma_num = eval_numerical_gradient_array(
        |gp| {
            let gp = gp.clone().into_dimensionality::<Ix1>().unwrap();
            layer_norm_forward(&x, &gp, &beta, EPS).0.into_dyn()
        },
        &gamma.clone().into_dyn(),
        &dout_dyn,
        1e-5,
    );
    let dbeta_num = eval_numerical_gradient_array(
        |bp| {
            let bp = bp.clone().into_dimensionality::<Ix1>().unwrap();
            layer_norm_forward(&x, &gamma, &bp, EPS).0.into_dyn()
        },
        &beta.clone().into_dyn(),
        &dout_dyn,
        1e-5,
    );

    assert!(rel_error(&dx.into_dyn(), &dx_num) < 1e-6);
    assert!(rel_error(&dgamma.into_dyn(), &dgamma_num) < 1e-7);
    assert!(rel_error(&dbeta.into_dyn(), &dbeta_num) < 1e-7);
}
