use parking_lot::RwLockReadGuard;
use std::sync::Arc;

use super::vector::VectorData;
use super::{MemoryError, MemoryResult, Orientation, SharedVector};

/// An ordered sequence of [`SharedVector`]s sharing one orientation and length.
///
/// Stored row-major (one vector per row) or column-major (one vector per
/// column). The matrix itself is unlocked: shape only changes through the
/// `load_*` methods, which need `&mut self`, while numeric updates go through
/// the per-vector locks.
///
/// Cloning yields another view of the *same* vectors, which is how row tasks
/// running on worker threads reach the engine's scratch matrices.
#[derive(Debug, Clone, Default)]
pub struct SharedMatrix {
    vectors: Vec<Arc<SharedVector>>,
}

impl SharedMatrix {
    /// Create an empty matrix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a row-major matrix from `rows`.
    pub fn from_rows(rows: &[Vec<f64>]) -> MemoryResult<Self> {
        let mut matrix = Self::new();
        matrix.load_row_major(rows)?;
        Ok(matrix)
    }

    /// Replace the contents with one row vector per input row.
    ///
    /// Shape is validated before anything is replaced.
    pub fn load_row_major(&mut self, rows: &[Vec<f64>]) -> MemoryResult<()> {
        validate_shape(rows)?;
        let vectors = rows
            .iter()
            .map(|row| SharedVector::new(row.clone(), Orientation::Row).map(Arc::new))
            .collect::<MemoryResult<Vec<_>>>()?;
        self.vectors = vectors;
        Ok(())
    }

    /// Replace the contents with one column vector per input column.
    ///
    /// Column `j` is built from element `j` of every input row.
    pub fn load_column_major(&mut self, rows: &[Vec<f64>]) -> MemoryResult<()> {
        let width = validate_shape(rows)?;
        let vectors = (0..width)
            .map(|j| {
                let column = rows.iter().map(|row| row[j]).collect();
                SharedVector::new(column, Orientation::Column).map(Arc::new)
            })
            .collect::<MemoryResult<Vec<_>>>()?;
        self.vectors = vectors;
        Ok(())
    }

    /// Copy the contents out as independent row-major rows.
    ///
    /// Holds the shared lock of every vector for the duration of the copy, so
    /// the result is coherent even while workers mutate individual vectors.
    /// Column-major storage is transposed on the way out.
    pub fn read_row_major(&self) -> Vec<Vec<f64>> {
        let mut order: Vec<usize> = (0..self.vectors.len()).collect();
        order.sort_by_key(|&i| self.vectors[i].id());

        let mut guards: Vec<Option<RwLockReadGuard<'_, VectorData>>> =
            self.vectors.iter().map(|_| None).collect();
        for &i in &order {
            guards[i] = Some(self.vectors[i].read());
        }

        let views: Vec<&VectorData> = guards.iter().flatten().map(|guard| &**guard).collect();
        let rows = match views.first() {
            None => Vec::new(),
            Some(first) => match first.orientation {
                Orientation::Row => views.iter().map(|data| data.values.clone()).collect(),
                Orientation::Column => (0..first.values.len())
                    .map(|i| {
                        views
                            .iter()
                            .filter_map(|data| data.values.get(i).copied())
                            .collect()
                    })
                    .collect(),
            },
        };
        drop(views);

        for &i in order.iter().rev() {
            guards[i] = None;
        }
        rows
    }

    /// Handle to the vector at `index`; mutating it mutates this matrix.
    pub fn get(&self, index: usize) -> MemoryResult<Arc<SharedVector>> {
        self.vectors
            .get(index)
            .cloned()
            .ok_or(MemoryError::IndexOutOfRange {
                index,
                len: self.vectors.len(),
            })
    }

    /// Handles to every stored vector, in order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<SharedVector>> + '_ {
        self.vectors.iter()
    }

    /// Number of stored vectors (rows if row-major, columns if column-major).
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Orientation of the stored vectors.
    pub fn orientation(&self) -> MemoryResult<Orientation> {
        self.vectors
            .first()
            .map(|vector| vector.orientation())
            .ok_or(MemoryError::EmptyMatrix)
    }
}

/// Check that every row is non-empty and all rows share one length.
/// Returns the common row length (0 for no rows).
fn validate_shape(rows: &[Vec<f64>]) -> MemoryResult<usize> {
    let Some(first) = rows.first() else {
        return Ok(0);
    };
    let width = first.len();
    for (row, values) in rows.iter().enumerate() {
        if values.is_empty() {
            return Err(MemoryError::EmptyRow { row });
        }
        if values.len() != width {
            return Err(MemoryError::RaggedRows {
                row,
                expected: width,
                found: values.len(),
            });
        }
    }
    Ok(width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn sample() -> Vec<Vec<f64>> {
        vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]
    }

    #[test]
    fn test_row_major_round_trip() {
        let m = SharedMatrix::from_rows(&sample()).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m.orientation().unwrap(), Orientation::Row);
        assert_eq!(m.read_row_major(), sample());
    }

    #[test]
    fn test_column_major_load_reads_back_input() {
        let mut m = SharedMatrix::new();
        m.load_column_major(&sample()).unwrap();
        assert_eq!(m.len(), 3);
        assert_eq!(m.orientation().unwrap(), Orientation::Column);
        assert_eq!(m.get(1).unwrap().to_vec(), vec![2.0, 5.0]);
        assert_eq!(m.read_row_major(), sample());
    }

    #[test]
    fn test_flipping_columns_reads_transpose() {
        let mut m = SharedMatrix::new();
        m.load_column_major(&sample()).unwrap();
        for i in 0..m.len() {
            m.get(i).unwrap().transpose();
        }
        assert_eq!(
            m.read_row_major(),
            vec![vec![1.0, 4.0], vec![2.0, 5.0], vec![3.0, 6.0]]
        );
    }

    #[test]
    fn test_ragged_rows_rejected_without_mutation() {
        let mut m = SharedMatrix::from_rows(&sample()).unwrap();
        let ragged = vec![vec![1.0, 2.0], vec![3.0]];

        assert_eq!(
            m.load_row_major(&ragged).unwrap_err(),
            MemoryError::RaggedRows {
                row: 1,
                expected: 2,
                found: 1
            }
        );
        assert!(m.load_column_major(&ragged).is_err());
        assert_eq!(m.read_row_major(), sample());
    }

    #[test]
    fn test_empty_row_rejected() {
        let mut m = SharedMatrix::new();
        let result = m.load_row_major(&[vec![], vec![]]);
        assert_eq!(result.unwrap_err(), MemoryError::EmptyRow { row: 0 });
        assert!(m.is_empty());
    }

    #[test]
    fn test_empty_matrix() {
        let mut m = SharedMatrix::new();
        assert_eq!(m.orientation().unwrap_err(), MemoryError::EmptyMatrix);
        assert!(m.read_row_major().is_empty());

        m.load_column_major(&[]).unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn test_get_bounds_and_shared_handle() {
        let m = SharedMatrix::from_rows(&sample()).unwrap();
        assert_eq!(
            m.get(2).unwrap_err(),
            MemoryError::IndexOutOfRange { index: 2, len: 2 }
        );

        m.get(0).unwrap().negate();
        assert_eq!(m.read_row_major()[0], vec![-1.0, -2.0, -3.0]);

        let ids: Vec<_> = m.iter().map(|v| v.id()).collect();
        assert_eq!(ids, vec![m.get(0).unwrap().id(), m.get(1).unwrap().id()]);
    }

    #[test]
    fn test_clone_shares_vectors_until_reload() {
        let mut m = SharedMatrix::from_rows(&sample()).unwrap();
        let view = m.clone();
        view.get(1).unwrap().negate();
        assert_eq!(m.read_row_major()[1], vec![-4.0, -5.0, -6.0]);

        m.load_row_major(&[vec![0.0]]).unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(m.read_row_major(), vec![vec![0.0]]);
    }

    #[test]
    fn test_snapshots_alongside_row_writers() {
        let m = SharedMatrix::from_rows(&vec![vec![1.0; 16]; 8]).unwrap();

        let writers: Vec<_> = (0..m.len())
            .map(|i| {
                let row = m.get(i).unwrap();
                thread::spawn(move || {
                    for _ in 0..500 {
                        row.negate();
                    }
                })
            })
            .collect();

        for _ in 0..200 {
            let snapshot = m.read_row_major();
            assert_eq!(snapshot.len(), 8);
            for row in &snapshot {
                assert!(row.iter().all(|x| x.abs() == 1.0));
                assert!(row.iter().all(|x| *x == row[0]));
            }
        }

        for writer in writers {
            writer.join().unwrap();
        }
        assert_eq!(m.read_row_major(), vec![vec![1.0; 16]; 8]);
    }
}
