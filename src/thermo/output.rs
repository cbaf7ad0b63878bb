//! Plain-text table output.

use std::io::{self, Write};

use crate::thermo::Thermodynamics;

impl Thermodynamics {
    /// Write the tabulated history, one row per grid point in order of
    /// increasing redshift.
    pub fn write_table<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let table = &self.table;
        let layout = table.layout;

        write!(
            writer,
            "# z              conf. time [Mpc] x_e            kappa' [Mpc^-1] \
             exp(-kappa)    g [Mpc^-1]     Tb [K]         c_b^2          tau_d"
        )?;
        if layout.r_d.is_some() {
            write!(writer, "          r_d [Mpc]")?;
        }
        writeln!(writer)?;

        for row in 0..table.n_rows() {
            let values = table.row(row);
            write!(
                writer,
                "{:14.8e} {:14.8e} {:14.8e} {:14.8e} {:14.8e} {:14.8e} {:14.8e} {:14.8e} {:14.8e}",
                table.z[row],
                table.tau[row],
                values[layout.xe],
                values[layout.dkappa],
                values[layout.exp_m_kappa],
                values[layout.g],
                values[layout.tb],
                values[layout.cb2],
                values[layout.tau_d],
            )?;
            if let Some(col) = layout.r_d {
                write!(writer, " {:14.8e}", values[col])?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}
