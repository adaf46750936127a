use burn::{
    prelude::*,
    tensor::{backend::Backend, TensorData},
};

use crate::nn::{Flow, Value};

/// A trait for converting batches of observations to a network [`Value`]
///
/// Implemented for `Vec`s of fixed-size arrays, one entry per example:
/// - `Vec<[f32; F]>` → `[batch, F]`
/// - `Vec<[[f32; F]; S]>` → `[batch, S, F]` (sequences)
/// - `Vec<[[[f32; W]; H]; C]>` → `[batch, C, H, W]` (channels-first images)
pub trait ToValue<B: Backend> {
    fn to_value(self, device: &B::Device) -> Value<B>;

    /// Same as [`to_value`](ToValue::to_value), wrapped as a single model input
    fn to_input(self, device: &B::Device) -> Flow<Value<B>>
    where
        Self: Sized,
    {
        Flow::Single(self.to_value(device))
    }
}

impl<B: Backend, const F: usize> ToValue<B> for Vec<[f32; F]> {
    #[inline]
    fn to_value(self, device: &B::Device) -> Value<B> {
        let batch_size = self.len();
        let mut flat = Vec::with_capacity(batch_size * F);
        for row in self.iter() {
            flat.extend_from_slice(row);
        }

        let data = TensorData::new(flat, [batch_size, F]);
        Value::Rank2(Tensor::<B, 2>::from_data(data, device))
    }
}

impl<B: Backend, const F: usize, const S: usize> ToValue<B> for Vec<[[f32; F]; S]> {
    #[inline]
    fn to_value(self, device: &B::Device) -> Value<B> {
        let batch_size = self.len();
        let mut flat = Vec::with_capacity(batch_size * S * F);
        for sequence in self.iter() {
            for step in sequence {
                flat.extend_from_slice(step);
            }
        }

        let data = TensorData::new(flat, [batch_size, S, F]);
        Value::Rank3(Tensor::<B, 3>::from_data(data, device))
    }
}

impl<B: Backend, const W: usize, const H: usize, const C: usize> ToValue<B>
    for Vec<[[[f32; W]; H]; C]>
{
    #[inline]
    fn to_value(self, device: &B::Device) -> Value<B> {
        let batch_size = self.len();
        let mut flat = Vec::with_capacity(batch_size * C * H * W);
        for image in self.iter() {
            for channel in image {
                for row in channel {
                    flat.extend_from_slice(row);
                }
            }
        }

        let data = TensorData::new(flat, [batch_size, C, H, W]);
        Value::Rank4(Tensor::<B, 4>::from_data(data, device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};

    #[test]
    fn test_vec_array_to_value_2d() {
        let device = NdArrayDevice::default();

        // Batch of 3 Chain observations, 4 features each
        let states = vec![
            [1.0_f32, 2.0, 3.0, 4.0],
            [5.0, 6.0, 7.0, 8.0],
            [9.0, 10.0, 11.0, 12.0],
        ];

        let value: Value<NdArray> = states.to_value(&device);

        assert_eq!(value.dims(), vec![3, 4]);
        let expected: Vec<f32> = (1..=12).map(|x| x as f32).collect();
        assert_eq!(value.to_vec(), expected);
    }

    #[test]
    fn test_sequences_to_value_3d() {
        let device = NdArrayDevice::default();

        let sequences = vec![[[0.0_f32; 5]; 7], [[1.0; 5]; 7]];
        let value: Value<NdArray> = sequences.to_value(&device);

        assert_eq!(value.dims(), vec![2, 7, 5]);
    }

    #[test]
    fn test_images_to_value_4d() {
        let device = NdArrayDevice::default();

        // One 2-channel 3x4 image: [channel][row][column]
        let mut image = [[[0.0_f32; 4]; 3]; 2];
        image[1][2][3] = 1.0;

        let value: Value<NdArray> = vec![image].to_value(&device);

        assert_eq!(value.dims(), vec![1, 2, 3, 4]);
        let data = value.to_vec();
        assert_eq!(data.len(), 24);
        assert_eq!(data[23], 1.0);
    }

    #[test]
    fn test_single_element_batch() {
        let device = NdArrayDevice::default();

        let input: Flow<Value<NdArray>> = vec![[1.0_f32, 2.0, 3.0]].to_input(&device);

        assert_eq!(input.signature(), Flow::Single(vec![3]));
    }
}
