// CoeffTensor — flat i32 buffer plus shape
//
// Batches are handed to the training framework as plain contiguous buffers
// with row-major shapes, so nothing here knows about autograd or devices.

/// A dense, row-major integer tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoeffTensor {
    data: Vec<i32>,
    shape: Vec<usize>,
}

impl CoeffTensor {
    /// Wrap an existing buffer.
    ///
    /// # Panics
    /// Panics if the buffer length does not match the shape's element count.
    pub fn new(data: Vec<i32>, shape: Vec<usize>) -> Self {
        let expected: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            expected,
            "buffer of {} elements does not fit shape {:?}",
            data.len(),
            shape
        );
        Self { data, shape }
    }

    /// A zero-filled tensor of the given shape.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let n: usize = shape.iter().product();
        Self {
            data: vec![0i32; n],
            shape,
        }
    }

    /// The row-major shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Total element count.
    pub fn elem_count(&self) -> usize {
        self.data.len()
    }

    /// The flat buffer.
    pub fn data(&self) -> &[i32] {
        &self.data
    }

    /// Mutable access to the flat buffer.
    pub fn data_mut(&mut self) -> &mut [i32] {
        &mut self.data
    }

    /// Number of elements in one leading-dimension slice (one sample of a
    /// batched tensor).
    pub fn stride0(&self) -> usize {
        self.shape[1..].iter().product()
    }

    /// Copy `src` into the i-th leading-dimension slice.
    ///
    /// # Panics
    /// Panics if `src` does not match the slice length.
    pub fn write_slice0(&mut self, i: usize, src: &[i32]) {
        let stride = self.stride0();
        assert_eq!(src.len(), stride, "slice length mismatch");
        self.data[i * stride..(i + 1) * stride].copy_from_slice(src);
    }

    /// Read the i-th leading-dimension slice.
    pub fn slice0(&self, i: usize) -> &[i32] {
        let stride = self.stride0();
        &self.data[i * stride..(i + 1) * stride]
    }
}
