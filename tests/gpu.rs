//! Runs kernels on a real adapter. Every test returns early when the machine
//! has no usable GPU.

#![cfg(feature = "wgpu")]

use texel_kernels::*;

fn gpu() -> Option<Gpu<WgpuDevice>> {
    match Gpu::shared() {
        Ok(gpu) => Some(gpu),
        Err(err) => {
            log::warn!("skipping GPU test: {err}");
            None
        }
    }
}

fn close(actual: &[f32], expected: &[f32]) -> bool {
    actual.len() == expected.len()
        && actual
            .iter()
            .zip(expected)
            .all(|(a, e)| (a - e).abs() <= e.abs() * 2f32.powi(-20))
}

#[test]
fn test_gpu_sum() {
    let Some(gpu) = gpu() else { return };
    let mut add = gpu
        .create_kernel("fn add(a, b) { return a[thread_id.x] + b[thread_id.x]; }")
        .dimensions([4])
        .build()
        .unwrap();

    let out = add
        .run(&[
            vec![1.0, 2.0, 3.0, 4.0].into(),
            vec![10.0, 20.0, 30.0, 40.0].into(),
        ])
        .unwrap();
    assert_eq!(out.into_flat(), Some(vec![11.0, 22.0, 33.0, 44.0]));
}

#[test]
fn test_gpu_index_rows_and_slices() {
    let Some(gpu) = gpu() else { return };

    let mut rows = gpu
        .create_kernel("fn index() { return thread_index; }")
        .dimensions([3, 2])
        .build()
        .unwrap();
    assert_eq!(
        rows.run(&[]).unwrap().into_rows(),
        Some(vec![vec![0.0, 1.0, 2.0], vec![3.0, 4.0, 5.0]])
    );

    let mut slices = gpu
        .create_kernel("fn coords() { return thread_id.z * 100.0 + thread_id.y * 10.0 + thread_id.x; }")
        .dimensions([2, 3, 2])
        .build()
        .unwrap();
    let out = slices.run(&[]).unwrap().into_slices().unwrap();
    assert_eq!(out[1][2], vec![120.0, 121.0]);
}

#[test]
fn test_gpu_codec_survives_a_round_trip() {
    let Some(gpu) = gpu() else { return };
    let values = vec![
        0.0,
        1.0,
        -1.0,
        0.5,
        -3.5,
        1e6 + 0.25,
        1e-4,
        123.456,
        -98765.43,
        3.0e30,
    ];
    let mut copy = gpu
        .create_kernel("fn copy(a) { return a[thread_id.x]; }")
        .build()
        .unwrap();

    let out = copy.run(&[values.clone().into()]).unwrap().into_flat().unwrap();
    assert!(close(&out, &values), "{out:?}");
}

#[test]
fn test_gpu_matrix_multiply_with_constants() {
    let Some(gpu) = gpu() else { return };
    let mut matmul = gpu
        .create_kernel(
            "fn matmul(a, b) {
                var sum = 0.0;
                for (var i = 0.0; i < constants.size; i = i + 1.0) {
                    sum = sum + a[thread_id.y][i] * b[i][thread_id.x];
                }
                return sum;
            }",
        )
        .constant("size", 2.0)
        .dimensions([2, 2])
        .build()
        .unwrap();

    let out = matmul
        .run(&[
            vec![vec![1.0, 2.0], vec![3.0, 4.0]].into(),
            vec![vec![5.0, 6.0], vec![7.0, 8.0]].into(),
        ])
        .unwrap();
    assert_eq!(out.into_rows(), Some(vec![vec![19.0, 22.0], vec![43.0, 50.0]]));
}

#[test]
fn test_gpu_wraparound_reads() {
    let Some(gpu) = gpu() else { return };
    let mut shift = gpu
        .create_kernel("fn shift(a) { return a[thread_id.x + 1.0]; }")
        .wraparound(true)
        .hardcode_constants(true)
        .build()
        .unwrap();

    let out = shift.run(&[vec![1.0, 2.0, 3.0].into()]).unwrap();
    assert_eq!(out.into_flat(), Some(vec![2.0, 3.0, 1.0]));
}

#[test]
fn test_gpu_wraparound_negative_offsets() {
    let Some(gpu) = gpu() else { return };
    for hardcode in [false, true] {
        for (offset, expected) in [
            ("- 1.0", [3.0, 1.0, 2.0]),
            ("- 4.0", [3.0, 1.0, 2.0]),
            ("+ 5.0", [3.0, 1.0, 2.0]),
        ] {
            let mut shift = gpu
                .create_kernel(&format!("fn shift(a) {{ return a[thread_id.x {offset}]; }}"))
                .wraparound(true)
                .hardcode_constants(hardcode)
                .build()
                .unwrap();

            let out = shift.run(&[vec![1.0, 2.0, 3.0].into()]).unwrap();
            assert_eq!(out.into_flat(), Some(expected.to_vec()), "{offset} hardcode={hardcode}");
        }
    }

    let mut rows = gpu
        .create_kernel("fn up(m) { return m[thread_id.y - 1.0][thread_id.x - 1.0]; }")
        .wraparound(true)
        .build()
        .unwrap();
    let out = rows
        .run(&[vec![vec![1.0, 2.0], vec![3.0, 4.0]].into()])
        .unwrap();
    assert_eq!(out.into_rows(), Some(vec![vec![4.0, 3.0], vec![2.0, 1.0]]));
}

#[test]
fn test_gpu_tensors_chain() {
    let Some(gpu) = gpu() else { return };
    let mut double = gpu
        .create_kernel("fn double(a, s) { return a[thread_id.x] * s; }")
        .output_to_texture(true)
        .dimensions([5])
        .build()
        .unwrap();
    let tensor = double
        .run(&[vec![1.0, 2.0, 3.0, 4.0, 5.0].into(), Argument::Scalar(2.0)])
        .unwrap()
        .into_tensor()
        .unwrap();

    let mut negate = gpu
        .create_kernel("fn negate(t) { return -t[thread_id.x]; }")
        .build()
        .unwrap();
    let out = negate.run(&[Argument::from(&tensor)]).unwrap();
    assert_eq!(out.into_flat(), Some(vec![-2.0, -4.0, -6.0, -8.0, -10.0]));
    assert_eq!(
        tensor.to_host(&gpu).unwrap().into_flat(),
        Some(vec![2.0, 4.0, 6.0, 8.0, 10.0])
    );
}

#[test]
fn test_gpu_graphical_canvas() {
    let Some(gpu) = gpu() else { return };
    let mut paint = gpu
        .create_kernel("fn paint() { color(1.0, 0.0, 0.0, 1.0); }")
        .graphical(true)
        .dimensions([8, 4])
        .build()
        .unwrap();

    assert!(paint.run(&[]).unwrap().is_none());
    let (size, pixels) = paint.canvas_pixels().unwrap();
    assert_eq!(size, TexSize::new(8, 4));
    assert!(pixels.chunks_exact(4).all(|px| px == [255, 0, 0, 255]));
}

#[test]
fn test_gpu_compile_errors_are_reported() {
    let Some(gpu) = gpu() else { return };
    let mut broken = gpu
        .create_kernel("fn broken() { return undefined_name; }")
        .dimensions([1])
        .debug(true)
        .build()
        .unwrap();

    match broken.run(&[]).unwrap_err() {
        KernelError::ShaderCompile { program_text, .. } => assert!(program_text.is_some()),
        other => panic!("unexpected error {other}"),
    }
}
