use parking_lot::{RwLock, RwLockReadGuard};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{MemoryError, MemoryResult, Orientation, SharedMatrix};

/// Stable identity of a [`SharedVector`], used to order lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VectorId(u64);

impl VectorId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for VectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vector({})", self.0)
    }
}

/// Lock-protected contents of a vector.
#[derive(Debug)]
pub(crate) struct VectorData {
    pub(crate) values: Vec<f64>,
    pub(crate) orientation: Orientation,
}

/// A mutable vector of `f64` values guarded by its own reader/writer lock.
///
/// All operations take `&self`; mutation happens under the exclusive lock, so
/// a vector can be handed to several workers through an `Arc` at once.
#[derive(Debug)]
pub struct SharedVector {
    id: VectorId,
    data: RwLock<VectorData>,
}

impl SharedVector {
    /// Create a vector, rejecting an empty value sequence.
    pub fn new(values: Vec<f64>, orientation: Orientation) -> MemoryResult<Self> {
        if values.is_empty() {
            return Err(MemoryError::EmptyVector);
        }
        Ok(Self {
            id: VectorId::next(),
            data: RwLock::new(VectorData {
                values,
                orientation,
            }),
        })
    }

    pub fn id(&self) -> VectorId {
        self.id
    }

    /// Read the element at `index`.
    pub fn get(&self, index: usize) -> MemoryResult<f64> {
        let data = self.data.read();
        data.values
            .get(index)
            .copied()
            .ok_or(MemoryError::IndexOutOfRange {
                index,
                len: data.values.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.data.read().values.len()
    }

    /// Only true after multiplying by a matrix with no rows.
    pub fn is_empty(&self) -> bool {
        self.data.read().values.is_empty()
    }

    pub fn orientation(&self) -> Orientation {
        self.data.read().orientation
    }

    /// Copy the current values out.
    pub fn to_vec(&self) -> Vec<f64> {
        self.data.read().values.clone()
    }

    /// Flip the orientation. Values are unchanged.
    pub fn transpose(&self) {
        let mut data = self.data.write();
        data.orientation = data.orientation.flipped();
    }

    /// Replace every element `x` with `-x`.
    pub fn negate(&self) {
        let mut data = self.data.write();
        for value in data.values.iter_mut() {
            *value = -*value;
        }
    }

    /// Elementwise `self += other`.
    ///
    /// Both vectors must share orientation and length; on mismatch nothing is
    /// written. Takes the exclusive lock on `self` and the shared lock on
    /// `other`, in ascending id order.
    pub fn add(&self, other: &SharedVector) -> MemoryResult<()> {
        if self.id == other.id {
            let mut data = self.data.write();
            for value in data.values.iter_mut() {
                *value += *value;
            }
            return Ok(());
        }

        if self.id < other.id {
            let mut mine = self.data.write();
            let theirs = other.data.read();
            let result = add_into(&mut mine, &theirs);
            drop(theirs);
            drop(mine);
            result
        } else {
            let theirs = other.data.read();
            let mut mine = self.data.write();
            let result = add_into(&mut mine, &theirs);
            drop(mine);
            drop(theirs);
            result
        }
    }

    /// Inner product of a row vector (`self`) with a column vector (`other`).
    ///
    /// Orientation is not checked when both vectors have length 1.
    pub fn dot(&self, other: &SharedVector) -> MemoryResult<f64> {
        if self.id == other.id {
            let data = self.data.read();
            return dot_of(&data, &data);
        }

        if self.id < other.id {
            let lhs = self.data.read();
            let rhs = other.data.read();
            let result = dot_of(&lhs, &rhs);
            drop(rhs);
            drop(lhs);
            result
        } else {
            let rhs = other.data.read();
            let lhs = self.data.read();
            let result = dot_of(&lhs, &rhs);
            drop(lhs);
            drop(rhs);
            result
        }
    }

    /// Replace `self` (a 1xN row) with `self * matrix`.
    ///
    /// The matrix is read as a coherent row-major snapshot before the exclusive
    /// lock on `self` is taken, since the matrix may contain `self`. The
    /// orientation and length checks, the product and the storage swap all
    /// run under that lock, against the snapshot. A matrix with no rows
    /// yields an empty vector.
    pub fn vec_mat_mul(&self, matrix: &SharedMatrix) -> MemoryResult<()> {
        let rows = matrix.read_row_major();

        let mut data = self.data.write();
        if data.orientation != Orientation::Row {
            return Err(MemoryError::OrientationMismatch {
                expected: Orientation::Row,
                found: data.orientation,
            });
        }

        if rows.is_empty() {
            data.values = Vec::new();
            return Ok(());
        }

        if rows.len() != data.values.len() {
            return Err(MemoryError::LengthMismatch {
                left: data.values.len(),
                right: rows.len(),
            });
        }

        let mut product = vec![0.0; rows[0].len()];
        for (x, row) in data.values.iter().zip(&rows) {
            for (acc, m) in product.iter_mut().zip(row) {
                *acc += x * m;
            }
        }
        data.values = product;
        Ok(())
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, VectorData> {
        self.data.read()
    }

    #[cfg(test)]
    pub(crate) fn write(&self) -> parking_lot::RwLockWriteGuard<'_, VectorData> {
        self.data.write()
    }
}

fn add_into(dst: &mut VectorData, src: &VectorData) -> MemoryResult<()> {
    if dst.orientation != src.orientation {
        return Err(MemoryError::OrientationMismatch {
            expected: dst.orientation,
            found: src.orientation,
        });
    }
    if dst.values.len() != src.values.len() {
        return Err(MemoryError::LengthMismatch {
            left: dst.values.len(),
            right: src.values.len(),
        });
    }
    for (acc, x) in dst.values.iter_mut().zip(&src.values) {
        *acc += x;
    }
    Ok(())
}

fn dot_of(lhs: &VectorData, rhs: &VectorData) -> MemoryResult<f64> {
    if lhs.values.len() != rhs.values.len() {
        return Err(MemoryError::LengthMismatch {
            left: lhs.values.len(),
            right: rhs.values.len(),
        });
    }
    let scalar = lhs.values.len() == 1;
    if !scalar && lhs.orientation != Orientation::Row {
        return Err(MemoryError::OrientationMismatch {
            expected: Orientation::Row,
            found: lhs.orientation,
        });
    }
    if !scalar && rhs.orientation != Orientation::Column {
        return Err(MemoryError::OrientationMismatch {
            expected: Orientation::Column,
            found: rhs.orientation,
        });
    }
    Ok(lhs
        .values
        .iter()
        .zip(&rhs.values)
        .map(|(a, b)| a * b)
        .sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn row(values: &[f64]) -> SharedVector {
        SharedVector::new(values.to_vec(), Orientation::Row).unwrap()
    }

    fn column(values: &[f64]) -> SharedVector {
        SharedVector::new(values.to_vec(), Orientation::Column).unwrap()
    }

    #[test]
    fn test_empty_vector_rejected() {
        let result = SharedVector::new(Vec::new(), Orientation::Row);
        assert_eq!(result.unwrap_err(), MemoryError::EmptyVector);
    }

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let a = row(&[1.0]);
        let b = row(&[1.0]);
        assert!(a.id() < b.id());
    }

    #[test]
    fn test_get_and_bounds() {
        let v = row(&[1.0, 2.0, 3.0]);
        assert_eq!(v.get(2).unwrap(), 3.0);
        assert_eq!(
            v.get(3).unwrap_err(),
            MemoryError::IndexOutOfRange { index: 3, len: 3 }
        );
        assert_eq!(v.len(), 3);
        assert!(!v.is_empty());
    }

    #[test]
    fn test_transpose_twice_restores() {
        let v = row(&[1.0, 2.0]);
        v.transpose();
        assert_eq!(v.orientation(), Orientation::Column);
        v.transpose();
        assert_eq!(v.orientation(), Orientation::Row);
        assert_eq!(v.to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_negate_is_self_inverse() {
        let v = row(&[1.0, -2.0, 0.0]);
        v.negate();
        assert_eq!(v.to_vec(), vec![-1.0, 2.0, -0.0]);
        v.negate();
        assert_eq!(v.to_vec(), vec![1.0, -2.0, 0.0]);
    }

    #[test]
    fn test_add() {
        let a = row(&[1.0, 2.0]);
        let b = row(&[10.0, 20.0]);
        a.add(&b).unwrap();
        assert_eq!(a.to_vec(), vec![11.0, 22.0]);
        assert_eq!(b.to_vec(), vec![10.0, 20.0]);
    }

    #[test]
    fn test_add_is_commutative() {
        let a1 = row(&[1.5, -2.0, 3.25]);
        let b1 = row(&[0.5, 4.0, -1.0]);
        let a2 = row(&[1.5, -2.0, 3.25]);
        let b2 = row(&[0.5, 4.0, -1.0]);
        a1.add(&b1).unwrap();
        b2.add(&a2).unwrap();
        assert_eq!(a1.to_vec(), b2.to_vec());
    }

    #[test]
    fn test_add_is_associative() {
        // (a + b) + c
        let a1 = row(&[1.0, 2.0]);
        let b1 = row(&[3.0, 4.0]);
        let c1 = row(&[5.0, 6.0]);
        a1.add(&b1).unwrap();
        a1.add(&c1).unwrap();

        // a + (b + c)
        let a2 = row(&[1.0, 2.0]);
        let b2 = row(&[3.0, 4.0]);
        let c2 = row(&[5.0, 6.0]);
        b2.add(&c2).unwrap();
        a2.add(&b2).unwrap();

        assert_eq!(a1.to_vec(), a2.to_vec());
        assert_eq!(a1.to_vec(), vec![9.0, 12.0]);
    }

    #[test]
    fn test_add_to_itself() {
        let a = row(&[1.0, 2.0]);
        a.add(&a).unwrap();
        assert_eq!(a.to_vec(), vec![2.0, 4.0]);
    }

    #[test]
    fn test_add_mismatch_leaves_operands_untouched() {
        let a = row(&[1.0, 2.0]);
        let short = row(&[1.0]);
        let col = column(&[1.0, 2.0]);

        assert_eq!(
            a.add(&short).unwrap_err(),
            MemoryError::LengthMismatch { left: 2, right: 1 }
        );
        assert!(matches!(
            a.add(&col),
            Err(MemoryError::OrientationMismatch { .. })
        ));
        assert_eq!(a.to_vec(), vec![1.0, 2.0]);
        assert_eq!(short.to_vec(), vec![1.0]);
        assert_eq!(col.to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_crossed_adds_do_not_deadlock() {
        let a = Arc::new(row(&[0.0; 8]));
        let b = Arc::new(row(&[0.0; 8]));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let a = Arc::clone(&a);
                let b = Arc::clone(&b);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        if i % 2 == 0 {
                            a.add(&b).unwrap();
                        } else {
                            b.add(&a).unwrap();
                        }
                        let _ = a.dot(&b);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn test_dot_row_column() {
        let r = row(&[1.0, 2.0, 3.0]);
        let c = column(&[4.0, 5.0, 6.0]);
        assert_eq!(r.dot(&c).unwrap(), 32.0);
    }

    #[test]
    fn test_dot_rejects_bad_orientation_and_length() {
        let r = row(&[1.0, 2.0]);
        let r2 = row(&[3.0, 4.0]);
        let c = column(&[1.0, 2.0]);
        let c3 = column(&[1.0, 2.0, 3.0]);

        assert!(matches!(
            r.dot(&r2),
            Err(MemoryError::OrientationMismatch { .. })
        ));
        assert!(matches!(
            c.dot(&r),
            Err(MemoryError::OrientationMismatch { .. })
        ));
        assert_eq!(
            r.dot(&c3).unwrap_err(),
            MemoryError::LengthMismatch { left: 2, right: 3 }
        );
        assert_eq!(r.to_vec(), vec![1.0, 2.0]);
        assert_eq!(r2.to_vec(), vec![3.0, 4.0]);
    }

    #[test]
    fn test_dot_length_one_ignores_orientation() {
        let a = column(&[3.0]);
        let b = row(&[4.0]);
        assert_eq!(a.dot(&b).unwrap(), 12.0);
    }

    #[test]
    fn test_vec_mat_mul() {
        let v = row(&[1.0, 2.0, 3.0]);
        let m = SharedMatrix::from_rows(&[
            vec![7.0, 8.0],
            vec![9.0, 10.0],
            vec![11.0, 12.0],
        ])
        .unwrap();
        v.vec_mat_mul(&m).unwrap();
        assert_eq!(v.to_vec(), vec![58.0, 64.0]);
        assert_eq!(v.orientation(), Orientation::Row);
    }

    #[test]
    fn test_vec_mat_mul_identity() {
        let v = row(&[4.0, -1.0, 2.5]);
        let identity = SharedMatrix::from_rows(&[
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ])
        .unwrap();
        v.vec_mat_mul(&identity).unwrap();
        assert_eq!(v.to_vec(), vec![4.0, -1.0, 2.5]);
    }

    #[test]
    fn test_vec_mat_mul_empty_matrix_yields_empty_vector() {
        let v = row(&[1.0, 2.0]);
        v.vec_mat_mul(&SharedMatrix::new()).unwrap();
        assert!(v.is_empty());
        assert_eq!(v.orientation(), Orientation::Row);
    }

    #[test]
    fn test_vec_mat_mul_mismatch_leaves_vector_untouched() {
        let v = row(&[1.0, 2.0]);
        let m = SharedMatrix::from_rows(&[vec![1.0], vec![2.0], vec![3.0]]).unwrap();
        assert_eq!(
            v.vec_mat_mul(&m).unwrap_err(),
            MemoryError::LengthMismatch { left: 2, right: 3 }
        );
        assert_eq!(v.to_vec(), vec![1.0, 2.0]);

        let c = column(&[1.0, 2.0, 3.0]);
        assert!(matches!(
            c.vec_mat_mul(&m),
            Err(MemoryError::OrientationMismatch { .. })
        ));
        assert_eq!(c.to_vec(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_vec_mat_mul_by_own_matrix() {
        let m = SharedMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let first = m.get(0).unwrap();
        first.vec_mat_mul(&m).unwrap();
        assert_eq!(first.to_vec(), vec![7.0, 10.0]);
    }

    #[test]
    fn test_write_guard_blocks_readers_until_released() {
        let v = Arc::new(row(&[1.0]));
        let guard = v.write();
        let reader = {
            let v = Arc::clone(&v);
            thread::spawn(move || v.get(0).unwrap())
        };
        thread::sleep(std::time::Duration::from_millis(20));
        assert!(!reader.is_finished());
        drop(guard);
        assert_eq!(reader.join().unwrap(), 1.0);
    }
}
