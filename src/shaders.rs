//! GLSL sources for the built-in programs and their compilation.
//!
//! All shaders target GLSL 1.40 (OpenGL 3.1). Every program shares the same
//! vertex stage and clip preamble; fragment outputs are premultiplied.

use glow::HasContext;

/// Vertex stage shared by every program.
///
/// # Uniforms
///
/// | Name           | Type   | Description                          |
/// |----------------|--------|--------------------------------------|
/// | `u_projection` | `mat4` | Orthographic projection              |
/// | `u_modelview`  | `mat4` | Node space to viewport space         |
///
/// Attribute 0 is the position, attribute 1 the texture coordinate.
pub const VERTEX_SRC: &str = r"#version 140

in vec2 a_position;
in vec2 a_uv;

uniform mat4 u_projection;
uniform mat4 u_modelview;

out vec2 v_position;
out vec2 v_clip_position;
out vec2 v_uv;

void main() {
    vec4 position = u_modelview * vec4(a_position, 0.0, 1.0);

    v_position = a_position;
    v_clip_position = position.xy;
    v_uv = a_uv;

    gl_Position = u_projection * position;
}
";

/// Rounded rectangle clipping, prepended to every fragment stage.
///
/// `u_clip_rect[0]` holds the bounds, `[1]` and `[2]` the corner radii
/// (top left, top right, bottom right, bottom left). Only `[0]` is uploaded
/// for rectilinear clips, leaving the radii at zero.
const FRAGMENT_PREAMBLE: &str = r"#version 140

in vec2 v_position;
in vec2 v_clip_position;
in vec2 v_uv;

uniform vec4 u_clip_rect[3];
uniform float u_alpha;

out vec4 frag_color;

float ellipse_coverage(vec2 point, vec2 center, vec2 radius) {
    if (radius.x <= 0.0 || radius.y <= 0.0) {
        return 1.0;
    }
    vec2 d = (point - center) / radius;
    return clamp(1.0 - (length(d) - 1.0) * min(radius.x, radius.y), 0.0, 1.0);
}

float clip_coverage(vec2 p) {
    vec4 b = u_clip_rect[0];
    if (p.x < b.x || p.y < b.y || p.x > b.x + b.z || p.y > b.y + b.w) {
        return 0.0;
    }

    vec2 tl = u_clip_rect[1].xy;
    vec2 tr = u_clip_rect[1].zw;
    vec2 br = u_clip_rect[2].xy;
    vec2 bl = u_clip_rect[2].zw;

    vec2 tl_c = b.xy + tl;
    vec2 tr_c = vec2(b.x + b.z - tr.x, b.y + tr.y);
    vec2 br_c = b.xy + b.zw - br;
    vec2 bl_c = vec2(b.x + bl.x, b.y + b.w - bl.y);

    if (p.x < tl_c.x && p.y < tl_c.y) return ellipse_coverage(p, tl_c, tl);
    if (p.x > tr_c.x && p.y < tr_c.y) return ellipse_coverage(p, tr_c, tr);
    if (p.x > br_c.x && p.y > br_c.y) return ellipse_coverage(p, br_c, br);
    if (p.x < bl_c.x && p.y > bl_c.y) return ellipse_coverage(p, bl_c, bl);
    return 1.0;
}

void write_color(vec4 premultiplied) {
    frag_color = premultiplied * u_alpha * clip_coverage(v_clip_position);
}
";

/// Fills with `u_color` (straight alpha).
pub const COLOR_FRAGMENT_SRC: &str = r"
uniform vec4 u_color;

void main() {
    write_color(vec4(u_color.rgb * u_color.a, u_color.a));
}
";

/// Linear gradient through up to six stops.
///
/// # Uniforms
///
/// | Name                | Type        | Description                       |
/// |---------------------|-------------|-----------------------------------|
/// | `u_points`          | `vec4`      | Start `xy`, end `zw`              |
/// | `u_num_color_stops` | `int`       | Stops in use                      |
/// | `u_color_stops`     | `float[30]` | Per stop: offset, then RGBA       |
pub const LINEAR_GRADIENT_FRAGMENT_SRC: &str = r"
uniform vec4 u_points;
uniform int u_num_color_stops;
uniform float u_color_stops[6 * 5];

vec4 stop_color(int i) {
    return vec4(u_color_stops[i * 5 + 1],
                u_color_stops[i * 5 + 2],
                u_color_stops[i * 5 + 3],
                u_color_stops[i * 5 + 4]);
}

void main() {
    vec2 start = u_points.xy;
    vec2 line = u_points.zw - start;
    float len2 = dot(line, line);
    float t = len2 > 0.0 ? dot(v_position - start, line) / len2 : 0.0;

    vec4 color = stop_color(0);
    for (int i = 1; i < u_num_color_stops; i++) {
        float prev = u_color_stops[(i - 1) * 5];
        float next = u_color_stops[i * 5];
        if (t > prev) {
            float f = next > prev ? clamp((t - prev) / (next - prev), 0.0, 1.0) : 1.0;
            color = mix(stop_color(i - 1), stop_color(i), f);
        }
    }

    write_color(vec4(color.rgb * color.a, color.a));
}
";

/// Samples `u_source`, which holds premultiplied texels.
pub const BLIT_FRAGMENT_SRC: &str = r"
uniform sampler2D u_source;

void main() {
    write_color(texture(u_source, v_uv));
}
";

/// Compile a shader program from a vertex stage and a fragment body. The
/// clip preamble is prepended to the fragment body.
///
/// The compiled shader objects are detached and deleted after successful
/// linking, so only the program handle needs to be cleaned up by the caller.
///
/// # Safety
///
/// Requires a valid, current OpenGL context.
///
/// # Errors
///
/// Returns a descriptive error string if shader compilation or program
/// linking fails.
pub unsafe fn compile_program(
    gl: &glow::Context,
    vertex_src: &str,
    fragment_src: &str,
) -> Result<glow::Program, String> {
    let program = unsafe { gl.create_program() }?;

    let fragment_src = format!("{FRAGMENT_PREAMBLE}{fragment_src}");
    let vs = unsafe { compile_shader(gl, glow::VERTEX_SHADER, vertex_src) }?;
    let fs = match unsafe { compile_shader(gl, glow::FRAGMENT_SHADER, &fragment_src) } {
        Ok(fs) => fs,
        Err(e) => {
            unsafe {
                gl.delete_shader(vs);
                gl.delete_program(program);
            }
            return Err(e);
        }
    };

    unsafe {
        gl.attach_shader(program, vs);
        gl.attach_shader(program, fs);
        gl.bind_attrib_location(program, 0, "a_position");
        gl.bind_attrib_location(program, 1, "a_uv");
        gl.link_program(program);

        if !gl.get_program_link_status(program) {
            let log = gl.get_program_info_log(program);
            gl.delete_program(program);
            gl.delete_shader(vs);
            gl.delete_shader(fs);
            return Err(format!("Program link error: {log}"));
        }

        gl.detach_shader(program, vs);
        gl.detach_shader(program, fs);
        gl.delete_shader(vs);
        gl.delete_shader(fs);
    }

    Ok(program)
}

/// Compile a single shader stage (vertex or fragment) from source.
///
/// # Safety
///
/// Requires a valid, current OpenGL context.
unsafe fn compile_shader(
    gl: &glow::Context,
    shader_type: u32,
    source: &str,
) -> Result<glow::Shader, String> {
    unsafe {
        let shader = gl.create_shader(shader_type)?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);

        if !gl.get_shader_compile_status(shader) {
            let log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            return Err(format!("Shader compile error: {log}"));
        }

        Ok(shader)
    }
}
