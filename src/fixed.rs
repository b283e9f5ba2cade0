// Signed 17.14 fixed-point arithmetic, the format the feedback-queue
// scheduler keeps load_avg and recent_cpu in. Products and quotients widen
// to 64 bits before rescaling so intermediate values cannot overflow.

use core::ops::{Add, AddAssign, Sub, SubAssign};

const SHIFT: u32 = 14;
const F: i32 = 1 << SHIFT;

#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Fixed(i32);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);

    pub const fn from_int(n: i32) -> Fixed {
        Fixed(n * F)
    }

    // Truncates toward zero.
    pub fn to_int(self) -> i32 {
        self.0 / F
    }

    // Rounds to the nearest integer, half away from zero.
    pub fn round(self) -> i32 {
        if self.0 >= 0 {
            (self.0 + F / 2) / F
        } else {
            (self.0 - F / 2) / F
        }
    }

    pub fn add_int(self, n: i32) -> Fixed {
        Fixed(self.0 + n * F)
    }

    pub fn sub_int(self, n: i32) -> Fixed {
        Fixed(self.0 - n * F)
    }

    pub fn mul(self, other: Fixed) -> Fixed {
        Fixed((self.0 as i64 * other.0 as i64 / F as i64) as i32)
    }

    pub fn div(self, other: Fixed) -> Fixed {
        Fixed((self.0 as i64 * F as i64 / other.0 as i64) as i32)
    }

    pub fn mul_int(self, n: i32) -> Fixed {
        Fixed(self.0 * n)
    }

    pub fn div_int(self, n: i32) -> Fixed {
        Fixed(self.0 / n)
    }
}

impl Add for Fixed {
    type Output = Fixed;
    fn add(self, other: Fixed) -> Fixed {
        Fixed(self.0 + other.0)
    }
}

impl AddAssign for Fixed {
    fn add_assign(&mut self, other: Fixed) {
        self.0 += other.0;
    }
}

impl Sub for Fixed {
    type Output = Fixed;
    fn sub(self, other: Fixed) -> Fixed {
        Fixed(self.0 - other.0)
    }
}

impl SubAssign for Fixed {
    fn sub_assign(&mut self, other: Fixed) {
        self.0 -= other.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(Fixed::from_int(5).to_int(), 5);
        assert_eq!(Fixed::from_int(-5).to_int(), -5);
        assert_eq!(Fixed::from_int(7).div_int(2).to_int(), 3);
        assert_eq!(Fixed::from_int(7).div_int(2).round(), 4);
        assert_eq!(Fixed::from_int(-7).div_int(2).round(), -4);
    }

    #[test]
    fn rounding_at_half() {
        // 2.5 rounds away from zero in both directions.
        let half_up = Fixed::from_int(5).div_int(2);
        assert_eq!(half_up.round(), 3);
        let half_down = Fixed::from_int(-5).div_int(2);
        assert_eq!(half_down.round(), -3);
    }

    #[test]
    fn widening_products() {
        // 59/60 * 60 == 59 without losing the fractional part to overflow.
        let c = Fixed::from_int(59).div(Fixed::from_int(60));
        assert_eq!(c.mul(Fixed::from_int(60)).round(), 59);

        // Large load values survive the 2*load/(2*load+1) coefficient.
        let load = Fixed::from_int(30_000);
        let twice = load.mul_int(2);
        let coef = twice.div(twice.add_int(1));
        assert!(coef.to_int() == 0 && coef.round() == 1);
    }

    #[test]
    fn int_mixing() {
        let x = Fixed::from_int(3).add_int(2);
        assert_eq!(x.to_int(), 5);
        assert_eq!(x.sub_int(4).to_int(), 1);
        assert_eq!(Fixed::from_int(3).mul_int(100).to_int(), 300);
    }
}
