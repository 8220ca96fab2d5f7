//! The HTTPS nginx site served in front of the PHP application.

use smsgw_common::config::SslSettings;

const CIPHERS: &str = "ECDHE-RSA-AES128-GCM-SHA256:ECDHE-RSA-AES256-GCM-SHA384:\
ECDHE-RSA-AES128-SHA256:ECDHE-RSA-AES256-SHA384";

/// Render the site file: a port 80 redirect and the TLS server block.
pub fn render_site(settings: &SslSettings) -> String {
    let server_name = &settings.server_name;
    let cert = settings.nginx_cert_path();
    let key = settings.nginx_key_path();

    format!(
        r#"server {{
    listen 80;
    server_name {server_name};
    return 301 https://$server_name$request_uri;
}}

server {{
    listen 443 ssl http2;
    server_name {server_name};

    root {root};
    index index.php index.html;

    ssl_certificate {cert};
    ssl_certificate_key {key};

    ssl_protocols TLSv1.2 TLSv1.3;
    ssl_ciphers {ciphers};
    ssl_prefer_server_ciphers off;
    ssl_session_cache shared:SSL:10m;
    ssl_session_timeout 10m;

    add_header Strict-Transport-Security "max-age=31536000; includeSubDomains" always;
    add_header X-Frame-Options DENY always;
    add_header X-Content-Type-Options nosniff always;
    add_header X-XSS-Protection "1; mode=block" always;

    access_log {access_log};
    error_log {error_log};

    location / {{
        try_files $uri $uri/ /index.php?$query_string;
    }}

    location ~ \.php$ {{
        include fastcgi_params;
        fastcgi_pass unix:{php_fpm};
        fastcgi_param SCRIPT_FILENAME $document_root$fastcgi_script_name;
        fastcgi_param HTTPS on;
        fastcgi_index index.php;
    }}

    location ~* \.(js|css|png|jpg|jpeg|gif|ico)$ {{
        try_files $uri =404;
        expires max;
        add_header Cache-Control "public, immutable";
    }}
}}
"#,
        root = settings.web_root,
        ciphers = CIPHERS,
        cert = cert.display(),
        key = key.display(),
        access_log = settings.access_log,
        error_log = settings.error_log,
        php_fpm = settings.php_fpm_socket,
    )
}
