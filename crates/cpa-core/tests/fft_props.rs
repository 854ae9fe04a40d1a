use num_complex::Complex64;
use proptest::prelude::*;

use cpa_core::fft::FftConvention;

fn field_strategy() -> impl Strategy<Value = (Vec<Complex64>, f64)> {
    let sample = (-10.0_f64..10.0, -10.0_f64..10.0).prop_map(|(re, im)| Complex64::new(re, im));
    (
        proptest::collection::vec(sample, 4..257),
        0.1_f64..8.0,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn forward_inverse_round_trips((field, dt_fs) in field_strategy()) {
        let conv = FftConvention::new(field.len(), dt_fs);
        let back = conv.inverse(&conv.forward(&field));
        for (a, b) in field.iter().zip(back.iter()) {
            prop_assert!((a - b).norm() < 1e-9);
        }
    }

    #[test]
    fn parseval_holds_for_arbitrary_fields((field, dt_fs) in field_strategy()) {
        let conv = FftConvention::new(field.len(), dt_fs);
        let spectrum = conv.forward(&field);
        let e_t = conv.energy_time(&field);
        let e_w = conv.energy_freq(&spectrum);
        prop_assert!((e_t - e_w).abs() <= 1e-9 * e_t.max(1e-12));
    }
}
