use approx::assert_abs_diff_eq;
use ndarray::{s, Array1, Array4, Ix1, Ix4};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::assert_err;
use crate::errors::NetError;
use crate::nn::grad_check::{eval_numerical_gradient_array, rel_error};
use crate::nn::layers::{
    group_norm_backward, group_norm_forward, spatial_batch_norm_backward,
    spatial_batch_norm_forward, BatchNormState,
};
use crate::nn::{Init, Mode};

const EPS: f64 = 1e-5;

fn seeded4(shape: [usize; 4], seed: u64) -> Array4<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Init::Normal { mean: 3.0, std: 2.0 }
        .generate(&shape, &mut rng)
        .into_dimensionality::<Ix4>()
        .unwrap()
}

fn channel_mean_var(x: &Array4<f64>, ci: usize) -> (f64, f64) {
    let slab = x.slice(s![.., ci, .., ..]);
    let m = slab.len() as f64;
    let mean = slab.iter().sum::<f64>() / m;
    let var = slab.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / m;
    (mean, var)
}

// ==================== 空间批归一化 ====================

/// 测试空间批归一化：训练模式下每个通道在 (N, H, W) 上近似零均值单位方差
#[test]
fn test_spatial_batch_norm_forward_normalizes_per_channel() {
    let x = seeded4([4, 3, 5, 5], 90);
    let gamma = Array1::from_elem(3, 1.0);
    let beta = Array1::zeros(3);
    let mut state = BatchNormState::new(3);
    let (out, cache) = spatial_batch_norm_forward(&x, &gamma, &beta, &mut state, Mode::Train);
    assert!(cache.is_some());
    assert_eq!(out.dim(), (4, 3, 5, 5));

    for ci in 0..3 {
        let (mean, var) = channel_mean_var(&out, ci);
        assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-8);
        assert_abs_diff_eq!(var, 1.0, epsilon = 1e-4);
    }
}

/// 测试空间批归一化的运行统计量按逐通道统计量更新
#[test]
fn test_spatial_batch_norm_running_stats() {
    let x = seeded4([2, 2, 3, 3], 91);
    let gamma = Array1::from_elem(2, 1.0);
    let beta = Array1::zeros(2);
    let mut state = BatchNormState::new(2);
    spatial_batch_norm_forward(&x, &gamma, &beta, &mut state, Mode::Train);
    for ci in 0..2 {
        let (mean, var) = channel_mean_var(&x, ci);
        assert_abs_diff_eq!(state.running_mean[ci], 0.1 * mean, epsilon = 1e-12);
        assert_abs_diff_eq!(state.running_var[ci], 0.1 * var, epsilon = 1e-12);
    }
}

/// 测试空间批归一化反向传播与数值梯度一致
#[test]
fn test_spatial_batch_norm_backward_matches_numerical() {
    let x = seeded4([2, 3, 2, 2], 92);
    let mut rng = StdRng::seed_from_u64(93);
    let gamma = Init::Normal { mean: 1.0, std: 0.2 }
        .generate(&[3], &mut rng)
        .into_dimensionality::<Ix1>()
        .unwrap();
    let beta = Init::Normal { mean: 0.0, std: 0.5 }
        .generate(&[3], &mut rng)
        .into_dimensionality::<Ix1>()
        .unwrap();
    let dout = seeded4([2, 3, 2, 2], 94);

    let mut state = BatchNormState::new(3);
    let (_, cache) = spatial_batch_norm_forward(&x, &gamma, &beta, &mut state, Mode::Train);
    let (dx, dgamma, dbeta) = spatial_batch_norm_backward(&dout, cache.unwrap());

    let dout_dyn = dout.clone().into_dyn();
    let dx_num = eval_numerical_gradient_array(
        |xp| {
            let xp = xp.clone().into_dimensionality::<Ix4>().unwrap();
            let mut s = BatchNormState::new(3);
            spatial_batch_norm_forward(&xp, &gamma, &beta, &mut s, Mode::Train)
                .0
                .into_dyn()
        },
        &x.clone().into_dyn(),
        &dout_dyn,
        1e-5,
    );
    let dgamma_num = eval_numerical_gradient_array(
        |gp| {
            let gp = gp.clone().into_dimensionality::<Ix1>().unwrap();
            let mut s = BatchNormState::new(3);
            spatial_batch_norm_forward(&x, &gp, &beta, &mut s, Mode::Train)
                .0
                .into_dyn()
        },
        &gamma.clone().into_dyn(),
        &dout_dyn,
        1e-5,
    );
    let dbeta_num = eval_numerical_gradient_array(
        |bp| {
            let bp = bp.clone().into_dimensionality::<Ix1>().unwrap();
            let mut s = BatchNormState::new(3);
            spatial_batch_norm_forward(&x, &gamma, &bp, &mut s, Mode::Train)
                .0
                .into_dyn()
        },
        &beta.clone().into_dyn(),
        &dout_dyn,
        1e-5,
    );

    assert!(rel_error(&dx.into_dyn(), &dx_num) < 1e-6);
    assert!(rel_error(&dgamma.into_dyn(), &dgamma_num) < 1e-7);
    assert!(rel_error(&dbeta.into_dyn(), &dbeta_num) < 1e-7);
}

// ==================== 组归一化 ====================

/// 测试组归一化：每个 (样本, 组) 在组内通道与空间位置上近似零均值单位方差
#[test]
fn test_group_norm_forward_normalizes_per_group() {
    let x = seeded4([2, 6, 4, 4], 95);
    let gamma = Array1::from_elem(6, 1.0);
    let beta = Array1::zeros(6);
    let groups = 2;
    let (out, _) = group_norm_forward(&x, &gamma, &beta, groups, EPS).unwrap();

    for ni in 0..2 {
        for g in 0..groups {
            let slab = out.slice(s![ni, g * 3..(g + 1) * 3, .., ..]);
            let m = slab.len() as f64;
            let mean = slab.iter().sum::<f64>() / m;
            let var = slab.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / m;
            assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-8);
            assert_abs_diff_eq!(var, 1.0, epsilon = 1e-4);
        }
    }
}

/// 测试组归一化与批量无关：逐样本单独归一化与批量内结果一致
#[test]
fn test_group_norm_forward_batch_independent() {
    let x = seeded4([3, 4, 2, 2], 96);
    let gamma = Array1::from_elem(4, 1.0);
    let beta = Array1::zeros(4);
    let (out_batch, _) = group_norm_forward(&x, &gamma, &beta, 2, EPS).unwrap();

    for ni in 0..3 {
        let single = x
            .slice(s![ni..ni + 1, .., .., ..])
            .to_owned();
        let (out_single, _) = group_norm_forward(&single, &gamma, &beta, 2, EPS).unwrap();
        assert_abs_diff_eq!(
            out_batch.slice(s![ni, .., .., ..]),
            out_single.slice(s![0, .., .., ..]),
            epsilon = 1e-12
        );
    }
}

/// 测试通道数不能被分组数整除时报错
#[test]
fn test_group_norm_rejects_indivisible_groups() {
    let x = seeded4([1, 5, 2, 2], 97);
    let gamma = Array1::from_elem(5, 1.0);
    let beta = Array1::zeros(5);
    for groups in [0, 2, 3] {
        let result = group_norm_forward(&x, &gamma, &beta, groups, EPS);
        assert_err!(result, NetError::InvalidConfig(msg) if msg.contains("整除"));
    }
}

/// 测试组归一化反向传播与数值梯度一致
#[test]
fn test_group_norm_backward_matches_numerical() {
    let x = seeded4([2, 4, 3, 3], 98);
    let mut rng = StdRng::seed_from_u64(99);
    let gamma = Init::Normal { mean: 1.0, std: 0.2 }
        .generate(&[4], &mut rng)
        .into_dimensionality::<Ix1>()
        .unwrap();
    let beta = Init::Normal { mean: 0.0, std: 0.5 }
        .generate(&[4], &mut rng)
        .into_dimensionality::<Ix1>()
        .unwrap();
    let dout = seeded4([2, 4, 3, 3], 100);
    let groups = 2;

    let (_, cache) = group_norm_forward(&x, &gamma, &beta, groups, EPS).unwrap();
    let (dx, dgamma, dbeta) = group_norm_backward(&dout, cache).unwrap();

    let dout_dyn = dout.clone().into_dyn();
    let dx_num = eval_numerical_gradient_array(
        |xp| {
            let xp = xp.clone().into_dimensionality::<Ix4>().unwrap();
            group_norm_forward(&xp, &gamma, &beta, groups, EPS)
                .unwrap()
                .0
                .into_dyn()
        },
        &x.clone().into_dyn(),
        &dout_dyn,
        1e-5,
    );
    let dgamma_num = eval_numerical_gradient_array(
        |gp| {
            let gp = gp.clone().into_dimensionality::<Ix1>().unwrap();
            group_norm_forward(&x, &gp, &beta, groups, EPS)
                .unwrap()
                .0
                .into_dyn()
        },
        &gamma.clone().into_dyn(),
        &dout_dyn,
        1e-5,
    );
    let dbeta_num = eval_numerical_gradient_array(
        |bp| {
            let bp = bp.clone().into_dimensionality::<Ix1>().unwrap();
            group_norm_forward(&x, &gamma, &bp, groups, EPS)
                .unwrap()
                .0
                .into_dyn()
        },
        &beta.clone().into_dyn(),
        &dout_dyn,
        1e-5,
    );

    assert!(rel_error(&dx.into_dyn(), &dx_num) < 1e-6);
    assert!(rel_error(&dgamma.into_dyn(), &dgamma_num) < 1e-7);
    assert!(rel_error(&dbeta.into_dyn(), &dbeta_num) < 1e-7);
}
