//! Butcher tableau catalog.
//!
//! Every tableau is `'static` data keyed by [`Method`]. Conventions:
//!
//! - `a[j - 1]` holds the coupling row of stage `j` (length `j`); stage 0 has
//!   no row and the strictly upper part is implicitly zero.
//! - `c[j - 1]` is the time fraction of stage `j`; stage 0 is at fraction 0.
//! - `b_diff` is `b_high - b_low` for embedded pairs. The stored weights `b`
//!   always propagate the solution.

use core::fmt;
use core::str::FromStr;

use crate::error::SimError;

/// Largest stage count in the catalog (Dormand-Prince 8(7)).
pub const MAX_STAGES: usize = 13;

/// Immutable Runge-Kutta coefficient table.
#[derive(Debug, PartialEq)]
pub struct ButcherTableau {
    pub name: &'static str,
    pub a: &'static [&'static [f64]],
    pub b: &'static [f64],
    pub c: &'static [f64],
    pub b_diff: Option<&'static [f64]>,
    pub order: f64,
    pub fsal: bool,
}

impl ButcherTableau {
    pub fn stages(&self) -> usize {
        self.b.len()
    }

    pub fn is_embedded(&self) -> bool {
        self.b_diff.is_some()
    }
}

/// Integration method selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub enum Method {
    /// Forward Euler, 1 stage.
    Euler,
    /// Heun's method, 2 stages.
    Rk2,
    /// Bogacki-Shampine third order, 3 stages.
    Rk3,
    /// Bogacki-Shampine 3(2) embedded pair, 4 stages, FSAL.
    Rk32,
    /// Classical fourth order, 4 stages.
    #[default]
    Rk4,
    /// Runge-Kutta-Merson, 5 stages with a fourth-order error estimate.
    Rk45Merson,
    /// Cash-Karp 5(4) embedded pair, 6 stages.
    Rk54CashKarp,
    /// Seven-stage sixth order (Luther's coefficients).
    Rk6,
    /// Dormand-Prince 8(7) embedded pair, 13 stages.
    Rk87,
    /// Fourth-order Adams-Bashforth predictor with Adams-Moulton corrector.
    AdamsBashforth4,
}

impl Method {
    pub const ALL: [Method; 10] = [
        Method::Euler,
        Method::Rk2,
        Method::Rk3,
        Method::Rk32,
        Method::Rk4,
        Method::Rk45Merson,
        Method::Rk54CashKarp,
        Method::Rk6,
        Method::Rk87,
        Method::AdamsBashforth4,
    ];

    /// Tableau driving this method; `None` for the multistep method.
    pub fn tableau(self) -> Option<&'static ButcherTableau> {
        match self {
            Method::Euler => Some(&EULER),
            Method::Rk2 => Some(&HEUN),
            Method::Rk3 => Some(&BOGACKI_SHAMPINE_3),
            Method::Rk32 => Some(&BOGACKI_SHAMPINE_32),
            Method::Rk4 => Some(&CLASSIC_RK4),
            Method::Rk45Merson => Some(&MERSON),
            Method::Rk54CashKarp => Some(&CASH_KARP),
            Method::Rk6 => Some(&SIXTH_ORDER),
            Method::Rk87 => Some(&DORMAND_PRINCE_87),
            Method::AdamsBashforth4 => None,
        }
    }

    /// True when steps carry an error estimate and are size-controlled.
    pub fn is_adaptive(self) -> bool {
        self.tableau().is_some_and(ButcherTableau::is_embedded)
    }

    pub fn is_multistep(self) -> bool {
        matches!(self, Method::AdamsBashforth4)
    }

    /// Short name used on the command line and in configuration files.
    pub fn short_name(self) -> &'static str {
        match self {
            Method::Euler => "euler",
            Method::Rk2 => "rk2",
            Method::Rk3 => "rk3",
            Method::Rk32 => "rk32",
            Method::Rk4 => "rk4",
            Method::Rk45Merson => "rk45merson",
            Method::Rk54CashKarp => "rk54cashkarp",
            Method::Rk6 => "rk6",
            Method::Rk87 => "rk87",
            Method::AdamsBashforth4 => "ab4",
        }
    }

    /// Human-readable name for diagnostics.
    pub fn display_name(self) -> &'static str {
        match self.tableau() {
            Some(tableau) => tableau.name,
            None => "Adams-Bashforth 4",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for Method {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Method::ALL
            .into_iter()
            .find(|m| m.short_name() == lower)
            .ok_or(SimError::InvalidArg {
                what: "unknown integration method",
            })
    }
}

impl TryFrom<String> for Method {
    type Error = SimError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Method> for String {
    fn from(value: Method) -> Self {
        value.short_name().to_string()
    }
}

pub static EULER: ButcherTableau = ButcherTableau {
    name: "Euler",
    a: &[],
    b: &[1.0],
    c: &[],
    b_diff: None,
    order: 1.0,
    fsal: false,
};

pub static HEUN: ButcherTableau = ButcherTableau {
    name: "Heun RK2",
    a: &[&[1.0]],
    b: &[0.5, 0.5],
    c: &[1.0],
    b_diff: None,
    order: 2.0,
    fsal: false,
};

pub static BOGACKI_SHAMPINE_3: ButcherTableau = ButcherTableau {
    name: "Bogacki-Shampine RK3",
    a: &[&[1.0 / 2.0], &[0.0, 3.0 / 4.0]],
    b: &[2.0 / 9.0, 1.0 / 3.0, 4.0 / 9.0],
    c: &[1.0 / 2.0, 3.0 / 4.0],
    b_diff: None,
    order: 3.0,
    fsal: false,
};

// Low-order weights 7/24, 1/4, 1/3, 1/8.
pub static BOGACKI_SHAMPINE_32: ButcherTableau = ButcherTableau {
    name: "Bogacki-Shampine RK3(2)",
    a: &[
        &[1.0 / 2.0],
        &[0.0, 3.0 / 4.0],
        &[2.0 / 9.0, 1.0 / 3.0, 4.0 / 9.0],
    ],
    b: &[2.0 / 9.0, 1.0 / 3.0, 4.0 / 9.0, 0.0],
    c: &[1.0 / 2.0, 3.0 / 4.0, 1.0],
    b_diff: Some(&[-5.0 / 72.0, 1.0 / 12.0, 1.0 / 9.0, -1.0 / 8.0]),
    order: 3.0,
    fsal: true,
};

pub static CLASSIC_RK4: ButcherTableau = ButcherTableau {
    name: "Runge-Kutta RK4",
    a: &[&[1.0 / 2.0], &[0.0, 1.0 / 2.0], &[0.0, 0.0, 1.0]],
    b: &[1.0 / 6.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 6.0],
    c: &[1.0 / 2.0, 1.0 / 2.0, 1.0],
    b_diff: None,
    order: 4.0,
    fsal: false,
};

// Error estimate (2k1 - 9k3 + 8k4 - k5) / 30.
pub static MERSON: ButcherTableau = ButcherTableau {
    name: "Runge-Kutta-Merson RK4(5)",
    a: &[
        &[1.0 / 3.0],
        &[1.0 / 6.0, 1.0 / 6.0],
        &[1.0 / 8.0, 0.0, 3.0 / 8.0],
        &[1.0 / 2.0, 0.0, -3.0 / 2.0, 2.0],
    ],
    b: &[1.0 / 6.0, 0.0, 0.0, 2.0 / 3.0, 1.0 / 6.0],
    c: &[1.0 / 3.0, 1.0 / 3.0, 1.0 / 2.0, 1.0],
    b_diff: Some(&[1.0 / 15.0, 0.0, -3.0 / 10.0, 4.0 / 15.0, -1.0 / 30.0]),
    order: 4.0,
    fsal: false,
};

// Fourth-order weights 2825/27648, 0, 18575/48384, 13525/55296, 277/14336, 1/4.
pub static CASH_KARP: ButcherTableau = ButcherTableau {
    name: "Cash-Karp RK5(4)",
    a: &[
        &[1.0 / 5.0],
        &[3.0 / 40.0, 9.0 / 40.0],
        &[3.0 / 10.0, -9.0 / 10.0, 6.0 / 5.0],
        &[-11.0 / 54.0, 5.0 / 2.0, -70.0 / 27.0, 35.0 / 27.0],
        &[
            1631.0 / 55296.0,
            175.0 / 512.0,
            575.0 / 13824.0,
            44275.0 / 110592.0,
            253.0 / 4096.0,
        ],
    ],
    b: &[
        37.0 / 378.0,
        0.0,
        250.0 / 621.0,
        125.0 / 594.0,
        0.0,
        512.0 / 1771.0,
    ],
    c: &[1.0 / 5.0, 3.0 / 10.0, 3.0 / 5.0, 1.0, 7.0 / 8.0],
    b_diff: Some(&[
        37.0 / 378.0 - 2825.0 / 27648.0,
        0.0,
        250.0 / 621.0 - 18575.0 / 48384.0,
        125.0 / 594.0 - 13525.0 / 55296.0,
        -277.0 / 14336.0,
        512.0 / 1771.0 - 1.0 / 4.0,
    ]),
    order: 5.0,
    fsal: false,
};

// Luther's seven-stage sixth-order method; nodes 0, 1/2, (7 -+ sqrt 21)/14
// and 1 with the weights of five-point Gauss-Lobatto quadrature.
const SQRT_21: f64 = 4.582_575_694_955_84;

pub static SIXTH_ORDER: ButcherTableau = ButcherTableau {
    name: "Runge-Kutta RK6",
    a: &[
        &[1.0],
        &[3.0 / 8.0, 1.0 / 8.0],
        &[8.0 / 27.0, 2.0 / 27.0, 8.0 / 27.0],
        &[
            (-21.0 + 9.0 * SQRT_21) / 392.0,
            (-56.0 + 8.0 * SQRT_21) / 392.0,
            (336.0 - 48.0 * SQRT_21) / 392.0,
            (-63.0 + 3.0 * SQRT_21) / 392.0,
        ],
        &[
            (-1155.0 - 255.0 * SQRT_21) / 1960.0,
            (-280.0 - 40.0 * SQRT_21) / 1960.0,
            (-320.0 * SQRT_21) / 1960.0,
            (63.0 + 363.0 * SQRT_21) / 1960.0,
            (2352.0 + 392.0 * SQRT_21) / 1960.0,
        ],
        &[
            (330.0 + 105.0 * SQRT_21) / 180.0,
            120.0 / 180.0,
            (-200.0 + 280.0 * SQRT_21) / 180.0,
            (126.0 - 189.0 * SQRT_21) / 180.0,
            (-686.0 - 126.0 * SQRT_21) / 180.0,
            (490.0 - 70.0 * SQRT_21) / 180.0,
        ],
    ],
    b: &[
        1.0 / 20.0,
        0.0,
        16.0 / 45.0,
        0.0,
        49.0 / 180.0,
        49.0 / 180.0,
        1.0 / 20.0,
    ],
    c: &[
        1.0,
        1.0 / 2.0,
        2.0 / 3.0,
        (7.0 - SQRT_21) / 14.0,
        (7.0 + SQRT_21) / 14.0,
        1.0,
    ],
    b_diff: None,
    order: 6.0,
    fsal: false,
};

// RK8(7)13M. Seventh-order weights:
// 13451932/455176623, 0, 0, 0, 0, -808719846/976000145, 1757004468/5645159321,
// 656045339/265891186, -3867574721/1518517206, 465885868/322736535,
// 53011238/667516719, 2/45, 0.
#[rustfmt::skip]
pub static DORMAND_PRINCE_87: ButcherTableau = ButcherTableau {
    name: "Dormand-Prince RK8(7)",
    a: &[
        &[1.0/18.0],
        &[1.0/48.0, 1.0/16.0],
        &[1.0/32.0, 0.0, 3.0/32.0],
        &[5.0/16.0, 0.0, -75.0/64.0, 75.0/64.0],
        &[3.0/80.0, 0.0, 0.0, 3.0/16.0, 3.0/20.0],
        &[29443841.0/614563906.0, 0.0, 0.0, 77736538.0/692538347.0, -28693883.0/1125000000.0, 23124283.0/1800000000.0],
        &[16016141.0/946692911.0, 0.0, 0.0, 61564180.0/158732637.0, 22789713.0/633445777.0, 545815736.0/2771057229.0, -180193667.0/1043307555.0],
        &[39632708.0/573591083.0, 0.0, 0.0, -433636366.0/683701615.0, -421739975.0/2616292301.0, 100302831.0/723423059.0, 790204164.0/839813087.0, 800635310.0/3783071287.0],
        &[246121993.0/1340847787.0, 0.0, 0.0, -37695042795.0/15268766246.0, -309121744.0/1061227803.0, -12992083.0/490766935.0, 6005943493.0/2108947869.0, 393006217.0/1396673457.0, 123872331.0/1001029789.0],
        &[-1028468189.0/846180014.0, 0.0, 0.0, 8478235783.0/508512852.0, 1311729495.0/1432422823.0, -10304129995.0/1701304382.0, -48777925059.0/3047939560.0, 15336726248.0/1032824649.0, -45442868181.0/3398467696.0, 3065993473.0/597172653.0],
        &[185892177.0/718116043.0, 0.0, 0.0, -3185094517.0/667107341.0, -477755414.0/1098053517.0, -703635378.0/230739211.0, 5731566787.0/1027545527.0, 5232866602.0/850066563.0, -4093664535.0/808688257.0, 3962137247.0/1805957418.0, 65686358.0/487910083.0],
        &[403863854.0/491063109.0, 0.0, 0.0, -5068492393.0/434740067.0, -411421997.0/543043805.0, 652783627.0/914296604.0, 11173962825.0/925320556.0, -13158990841.0/6184727034.0, 3936647629.0/1978049680.0, -160528059.0/685178525.0, 248638103.0/1413531060.0, 0.0],
    ],
    b: &[14005451.0/335480064.0, 0.0, 0.0, 0.0, 0.0, -59238493.0/1068277825.0, 181606767.0/758867731.0, 561292985.0/797845732.0, -1041891430.0/1371343529.0, 760417239.0/1151165299.0, 118820643.0/751138087.0, -528747749.0/2220607170.0, 1.0/4.0],
    c: &[1.0/18.0, 1.0/12.0, 1.0/8.0, 5.0/16.0, 3.0/8.0, 59.0/400.0, 93.0/200.0, 5490023248.0/9719169821.0, 13.0/20.0, 1201146811.0/1299019798.0, 1.0, 1.0],
    b_diff: Some(&[
        14005451.0/335480064.0 - 13451932.0/455176623.0,
        0.0, 0.0, 0.0, 0.0,
        -59238493.0/1068277825.0 + 808719846.0/976000145.0,
        181606767.0/758867731.0 - 1757004468.0/5645159321.0,
        561292985.0/797845732.0 - 656045339.0/265891186.0,
        -1041891430.0/1371343529.0 + 3867574721.0/1518517206.0,
        760417239.0/1151165299.0 - 465885868.0/322736535.0,
        118820643.0/751138087.0 - 53011238.0/667516719.0,
        -528747749.0/2220607170.0 - 2.0/45.0,
        1.0/4.0,
    ]),
    order: 8.0,
    fsal: false,
};
