//! Gaussian kernels and boundary-aware convolution for edge-like spectra.

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConvolutionError {
    #[error("gaussian sigma must be finite and > 0, got {value}")]
    InvalidSigma { value: f64 },
    #[error("axis step must be finite and > 0, got {value}")]
    InvalidStep { value: f64 },
    #[error("kernel sample count must be an odd number >= 3, got {count}")]
    InvalidKernelCount { count: usize },
    #[error("convolution kernel length must be odd, got {actual}")]
    EvenKernelLength { actual: usize },
    #[error("convolution input must not be empty")]
    EmptyData,
}

/// Symmetric Gaussian kernel on step multiples, half-width = 5 sigma in
/// step units, normalized to unit sum. Returns `None` when the half-width
/// rounds down to zero bins (sigma too small to resolve on this axis).
pub fn gaussian_kernel(sigma: f64, step: f64) -> Result<Option<Vec<f64>>, ConvolutionError> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(ConvolutionError::InvalidSigma { value: sigma });
    }
    if !step.is_finite() || step <= 0.0 {
        return Err(ConvolutionError::InvalidStep { value: step });
    }

    let half_width = (5.0 * sigma / step) as usize;
    if half_width == 0 {
        return Ok(None);
    }

    let mut kernel = Vec::with_capacity(2 * half_width + 1);
    for offset in -(half_width as isize)..=(half_width as isize) {
        let x = offset as f64 * step;
        kernel.push((-x * x / (2.0 * sigma * sigma)).exp());
    }
    normalize(&mut kernel);
    Ok(Some(kernel))
}

/// Symmetric Gaussian kernel on `count` evenly spaced samples spanning
/// +-5 sigma, normalized to unit sum. `count` must be odd so the kernel has
/// a central bin.
pub fn gaussian_kernel_with_count(
    sigma: f64,
    count: usize,
) -> Result<Vec<f64>, ConvolutionError> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(ConvolutionError::InvalidSigma { value: sigma });
    }
    if count < 3 || count.is_multiple_of(2) {
        return Err(ConvolutionError::InvalidKernelCount { count });
    }

    let span = 5.0 * sigma;
    let step = 2.0 * span / (count - 1) as f64;
    let mut kernel = Vec::with_capacity(count);
    for index in 0..count {
        let x = -span + step * index as f64;
        kernel.push((-x * x / (2.0 * sigma * sigma)).exp());
    }
    normalize(&mut kernel);
    Ok(kernel)
}

/// Same-length convolution with an odd, symmetric kernel; samples outside
/// the data read zero.
pub fn convolve_same(data: &[f64], kernel: &[f64]) -> Result<Vec<f64>, ConvolutionError> {
    validate_inputs(data, kernel)?;

    let half = kernel.len() / 2;
    let output = (0..data.len())
        .map(|center| {
            let mut accumulated = 0.0;
            for (tap, &weight) in kernel.iter().enumerate() {
                let index = center as isize + tap as isize - half as isize;
                if index >= 0 && (index as usize) < data.len() {
                    accumulated += data[index as usize] * weight;
                }
            }
            accumulated
        })
        .collect();
    Ok(output)
}

/// Convolution with edge-replicate padding by the kernel half-width, sliced
/// back to the input length. Avoids boundary darkening on spectra that do
/// not decay to zero at either end.
pub fn convolve_edge_padded(data: &[f64], kernel: &[f64]) -> Result<Vec<f64>, ConvolutionError> {
    validate_inputs(data, kernel)?;

    let half = kernel.len() / 2;
    let mut padded = Vec::with_capacity(data.len() + 2 * half);
    padded.extend(std::iter::repeat_n(data[0], half));
    padded.extend_from_slice(data);
    padded.extend(std::iter::repeat_n(data[data.len() - 1], half));

    let convolved = convolve_same(&padded, kernel)?;
    Ok(convolved[half..half + data.len()].to_vec())
}

/// Boundary-aware convolution for step-like signals: the occupied
/// (low-index) side is padded with the first sample, the unoccupied side
/// with zero, so the edge keeps its plateau values instead of bleeding.
pub fn convolve_edge_signal(data: &[f64], kernel: &[f64]) -> Result<Vec<f64>, ConvolutionError> {
    validate_inputs(data, kernel)?;

    let half = kernel.len() / 2;
    let mut padded = Vec::with_capacity(data.len() + 2 * half);
    padded.extend(std::iter::repeat_n(data[0], half));
    padded.extend_from_slice(data);
    padded.extend(std::iter::repeat_n(0.0, half));

    let output = (0..data.len())
        .map(|start| {
            kernel
                .iter()
                .enumerate()
                .map(|(tap, &weight)| padded[start + tap] * weight)
                .sum()
        })
        .collect();
    Ok(output)
}

fn validate_inputs(data: &[f64], kernel: &[f64]) -> Result<(), ConvolutionError> {
    if data.is_empty() {
        return Err(ConvolutionError::EmptyData);
    }
    if kernel.is_empty() || kernel.len().is_multiple_of(2) {
        return Err(ConvolutionError::EvenKernelLength {
            actual: kernel.len(),
        });
    }
    Ok(())
}

fn normalize(kernel: &mut [f64]) {
    let total: f64 = kernel.iter().sum();
    for value in kernel.iter_mut() {
        *value /= total;
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ConvolutionError, convolve_edge_padded, convolve_edge_signal, convolve_same,
        gaussian_kernel, gaussian_kernel_with_count,
    };

    #[test]
    fn step_kernel_has_unit_sum_and_expected_width() {
        let kernel = gaussian_kernel(0.002, 0.0004)
            .expect("kernel")
            .expect("resolvable width");
        assert_eq!(kernel.len(), 2 * 25 + 1);
        let total: f64 = kernel.iter().sum();
        assert!((total - 1.0).abs() <= 1.0e-12);
    }

    #[test]
    fn unresolvable_sigma_yields_no_kernel() {
        let kernel = gaussian_kernel(1.0e-6, 0.001).expect("kernel");
        assert!(kernel.is_none());
    }

    #[test]
    fn counted_kernel_is_symmetric_and_normalized() {
        let kernel = gaussian_kernel_with_count(0.004, 41).expect("kernel");
        assert_eq!(kernel.len(), 41);
        let total: f64 = kernel.iter().sum();
        assert!((total - 1.0).abs() <= 1.0e-12);
        for index in 0..20 {
            assert!((kernel[index] - kernel[40 - index]).abs() <= 1.0e-14);
        }

        let error = gaussian_kernel_with_count(0.004, 40).expect_err("even count should fail");
        assert_eq!(error, ConvolutionError::InvalidKernelCount { count: 40 });
    }

    #[test]
    fn impulse_convolution_reproduces_the_kernel() {
        let kernel = [0.25, 0.5, 0.25];
        let mut data = vec![0.0; 9];
        data[4] = 1.0;

        let convolved = convolve_same(&data, &kernel).expect("convolution");
        assert!((convolved[3] - 0.25).abs() <= 1.0e-15);
        assert!((convolved[4] - 0.5).abs() <= 1.0e-15);
        assert!((convolved[5] - 0.25).abs() <= 1.0e-15);
    }

    #[test]
    fn edge_padding_preserves_a_constant_signal() {
        let kernel = gaussian_kernel_with_count(1.0, 11).expect("kernel");
        let data = vec![2.5; 20];
        let convolved = convolve_edge_padded(&data, &kernel).expect("convolution");
        for value in convolved {
            assert!((value - 2.5).abs() <= 1.0e-12);
        }
    }

    #[test]
    fn step_aware_convolution_keeps_plateaus_outside_the_kernel_width() {
        let kernel = gaussian_kernel_with_count(1.0, 11).expect("kernel");
        let mut step = vec![1.0; 40];
        for value in step.iter_mut().skip(20) {
            *value = 0.0;
        }

        let convolved = convolve_edge_signal(&step, &kernel).expect("convolution");
        for &value in &convolved[..14] {
            assert!((value - 1.0).abs() <= 1.0e-9, "occupied plateau bled: {value}");
        }
        for &value in &convolved[26..] {
            assert!(value.abs() <= 1.0e-9, "unoccupied plateau bled: {value}");
        }
        // Complementary windows across the edge account for the full kernel.
        assert!((convolved[19] + convolved[20] - 1.0).abs() <= 1.0e-12);
    }

    #[test]
    fn convolution_rejects_even_kernels_and_empty_data() {
        let error = convolve_same(&[1.0, 2.0], &[0.5, 0.5]).expect_err("even kernel");
        assert_eq!(error, ConvolutionError::EvenKernelLength { actual: 2 });

        let error = convolve_edge_signal(&[], &[1.0]).expect_err("empty data");
        assert_eq!(error, ConvolutionError::EmptyData);
    }
}
