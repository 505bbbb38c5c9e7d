/// Decide if two arrays are equal.
///
/// Defaultly, the arrays are considered equal if they have the same shape and the squared error summed over all elements is less than 1e-6.
///
/// You can also explicitly specify the tolerance by passing a third argument.
#[macro_export]
macro_rules! array_eq {
    ($a:expr, $b:expr) => {{
        $crate::array_eq!($a, $b, 1e-6)
    }};
    ($a:expr, $b:expr, $c:expr) => {{
        $a.shape() == $b.shape()
            && $a
                .iter()
                .zip($b.iter())
                .map(|(x, y)| (f64::from(*x) - f64::from(*y)).powi(2))
                .sum::<f64>()
                < $c
    }};
}

/// Assert if two arrays are equal.
///
/// Defaultly, the arrays are considered equal if they have the same shape and the squared error summed over all elements is less than 1e-6.
///
/// You can also explicitly specify the tolerance by passing a third argument.
#[macro_export]
macro_rules! assert_array_eq {
    ($a:expr, $b:expr) => {
        assert!($crate::array_eq!($a, $b), "{:?} != {:?}", $a, $b);
    };
    ($a:expr, $b:expr, $c:expr) => {
        assert!($crate::array_eq!($a, $b, $c), "{:?} != {:?}", $a, $b);
    };
}
